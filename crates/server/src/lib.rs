pub mod bootstrap;
pub mod health;
pub mod relay;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use relay::HttpRelayTransport;
