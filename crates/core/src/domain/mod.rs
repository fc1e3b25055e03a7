pub mod complaint;
pub mod directory;
pub mod history;
pub mod notification;
