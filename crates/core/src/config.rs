use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifications::{ChannelToggles, DeliveryPolicy};
use crate::permissions::PermissionMatrix;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub notifications: NotificationsConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Re-plans allowed after losing an optimistic version race.
    pub max_conflict_retries: u32,
    pub employee_handoff_within_department: bool,
}

#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub backoff_multiplier: u32,
    pub max_delay_secs: u64,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub email_enabled: bool,
    pub whatsapp_enabled: bool,
}

/// Outbound HTTP relay that fans messages out to the email and messaging providers.
/// Without a URL, delivery is a no-op.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub url: Option<String>,
    pub token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
    pub max_conflict_retries: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://casetrack.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig {
                max_conflict_retries: 3,
                employee_handoff_within_department: false,
            },
            notifications: NotificationsConfig {
                max_attempts: 5,
                base_delay_secs: 5,
                backoff_multiplier: 2,
                max_delay_secs: 900,
                poll_interval_ms: 1_000,
                batch_size: 100,
                email_enabled: true,
                whatsapp_enabled: true,
            },
            relay: RelayConfig { url: None, token: None, timeout_secs: 10 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WorkflowConfig {
    pub fn permission_matrix(&self) -> PermissionMatrix {
        PermissionMatrix::new(self.employee_handoff_within_department)
    }
}

impl NotificationsConfig {
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: self.max_attempts,
            base_delay_seconds: i64::try_from(self.base_delay_secs).unwrap_or(i64::MAX),
            backoff_multiplier: self.backoff_multiplier,
            max_delay_seconds: i64::try_from(self.max_delay_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn channel_toggles(&self) -> ChannelToggles {
        ChannelToggles { email: self.email_enabled, whatsapp: self.whatsapp_enabled }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("casetrack.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(max_conflict_retries) = workflow.max_conflict_retries {
                self.workflow.max_conflict_retries = max_conflict_retries;
            }
            if let Some(handoff) = workflow.employee_handoff_within_department {
                self.workflow.employee_handoff_within_department = handoff;
            }
        }

        if let Some(notifications) = patch.notifications {
            let target = &mut self.notifications;
            if let Some(max_attempts) = notifications.max_attempts {
                target.max_attempts = max_attempts;
            }
            if let Some(base_delay_secs) = notifications.base_delay_secs {
                target.base_delay_secs = base_delay_secs;
            }
            if let Some(backoff_multiplier) = notifications.backoff_multiplier {
                target.backoff_multiplier = backoff_multiplier;
            }
            if let Some(max_delay_secs) = notifications.max_delay_secs {
                target.max_delay_secs = max_delay_secs;
            }
            if let Some(poll_interval_ms) = notifications.poll_interval_ms {
                target.poll_interval_ms = poll_interval_ms;
            }
            if let Some(batch_size) = notifications.batch_size {
                target.batch_size = batch_size;
            }
            if let Some(email_enabled) = notifications.email_enabled {
                target.email_enabled = email_enabled;
            }
            if let Some(whatsapp_enabled) = notifications.whatsapp_enabled {
                target.whatsapp_enabled = whatsapp_enabled;
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(url) = relay.url {
                self.relay.url = Some(url);
            }
            if let Some(relay_token_value) = relay.token {
                self.relay.token = Some(secret_value(relay_token_value));
            }
            if let Some(timeout_secs) = relay.timeout_secs {
                self.relay.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CASETRACK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CASETRACK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CASETRACK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CASETRACK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CASETRACK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CASETRACK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("CASETRACK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CASETRACK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CASETRACK_WORKFLOW_MAX_CONFLICT_RETRIES") {
            self.workflow.max_conflict_retries =
                parse_u32("CASETRACK_WORKFLOW_MAX_CONFLICT_RETRIES", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_WORKFLOW_EMPLOYEE_HANDOFF_WITHIN_DEPARTMENT") {
            self.workflow.employee_handoff_within_department =
                parse_bool("CASETRACK_WORKFLOW_EMPLOYEE_HANDOFF_WITHIN_DEPARTMENT", &value)?;
        }

        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_MAX_ATTEMPTS") {
            self.notifications.max_attempts =
                parse_u32("CASETRACK_NOTIFICATIONS_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_BASE_DELAY_SECS") {
            self.notifications.base_delay_secs =
                parse_u64("CASETRACK_NOTIFICATIONS_BASE_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_BACKOFF_MULTIPLIER") {
            self.notifications.backoff_multiplier =
                parse_u32("CASETRACK_NOTIFICATIONS_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_MAX_DELAY_SECS") {
            self.notifications.max_delay_secs =
                parse_u64("CASETRACK_NOTIFICATIONS_MAX_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_POLL_INTERVAL_MS") {
            self.notifications.poll_interval_ms =
                parse_u64("CASETRACK_NOTIFICATIONS_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_BATCH_SIZE") {
            self.notifications.batch_size =
                parse_u32("CASETRACK_NOTIFICATIONS_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_EMAIL_ENABLED") {
            self.notifications.email_enabled =
                parse_bool("CASETRACK_NOTIFICATIONS_EMAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CASETRACK_NOTIFICATIONS_WHATSAPP_ENABLED") {
            self.notifications.whatsapp_enabled =
                parse_bool("CASETRACK_NOTIFICATIONS_WHATSAPP_ENABLED", &value)?;
        }

        if let Some(value) = read_env("CASETRACK_RELAY_URL") {
            self.relay.url = Some(value);
        }
        if let Some(value) = read_env("CASETRACK_RELAY_TOKEN") {
            self.relay.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CASETRACK_RELAY_TIMEOUT_SECS") {
            self.relay.timeout_secs = parse_u64("CASETRACK_RELAY_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("CASETRACK_LOGGING_LEVEL").or_else(|| read_env("CASETRACK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CASETRACK_LOGGING_FORMAT").or_else(|| read_env("CASETRACK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(relay_url) = overrides.relay_url {
            self.relay.url = Some(relay_url);
        }
        if let Some(relay_token) = overrides.relay_token {
            self.relay.token = Some(secret_value(relay_token));
        }
        if let Some(max_conflict_retries) = overrides.max_conflict_retries {
            self.workflow.max_conflict_retries = max_conflict_retries;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_notifications(&self.notifications)?;
        validate_relay(&self.relay)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("casetrack.toml"), PathBuf::from("config/casetrack.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.max_conflict_retries > 50 {
        return Err(ConfigError::Validation(
            "workflow.max_conflict_retries must be in range 0..=50".to_string(),
        ));
    }
    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if notifications.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "notifications.max_attempts must be greater than zero".to_string(),
        ));
    }
    if notifications.backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "notifications.backoff_multiplier must be greater than zero".to_string(),
        ));
    }
    if notifications.max_delay_secs < notifications.base_delay_secs {
        return Err(ConfigError::Validation(
            "notifications.max_delay_secs must not be smaller than notifications.base_delay_secs"
                .to_string(),
        ));
    }
    if notifications.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "notifications.poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    if notifications.batch_size == 0 {
        return Err(ConfigError::Validation(
            "notifications.batch_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_relay(relay: &RelayConfig) -> Result<(), ConfigError> {
    if let Some(url) = &relay.url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "relay.url must start with http:// or https://".to_string(),
            ));
        }
    }

    let empty_token = relay.token.as_ref().is_some_and(|token| token.expose_secret().trim().is_empty());
    if empty_token {
        return Err(ConfigError::Validation(
            "relay.token must not be empty when set".to_string(),
        ));
    }

    if relay.timeout_secs == 0 || relay.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "relay.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    notifications: Option<NotificationsPatch>,
    relay: Option<RelayPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    max_conflict_retries: Option<u32>,
    employee_handoff_within_department: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    max_attempts: Option<u32>,
    base_delay_secs: Option<u64>,
    backoff_multiplier: Option<u32>,
    max_delay_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    batch_size: Option<u32>,
    email_enabled: Option<bool>,
    whatsapp_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://casetrack.db", "default database url")?;
        ensure(config.workflow.max_conflict_retries == 3, "default conflict retries")?;
        ensure(config.relay.url.is_none(), "relay is disabled by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        ensure(config.notifications.delivery_policy().max_attempts == 5, "default attempts")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RELAY_TOKEN", "relay-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("casetrack.toml");
            fs::write(
                &path,
                r#"
[relay]
url = "https://relay.internal/send"
token = "${TEST_RELAY_TOKEN}"

[notifications]
whatsapp_enabled = false
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.relay.token.as_ref().map(|token| token.expose_secret().to_string());
            ensure(token.as_deref() == Some("relay-from-env"), "token should be interpolated")?;
            ensure(
                !config.notifications.channel_toggles().whatsapp,
                "whatsapp should be disabled from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_RELAY_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CASETRACK_LOG_LEVEL", "warn");
        env::set_var("CASETRACK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CASETRACK_LOG_LEVEL", "CASETRACK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CASETRACK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CASETRACK_WORKFLOW_EMPLOYEE_HANDOFF_WITHIN_DEPARTMENT", "true");
        env::set_var("CASETRACK_NOTIFICATIONS_MAX_ATTEMPTS", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("casetrack.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[workflow]
max_conflict_retries = 5
employee_handoff_within_department = false

[notifications]
max_attempts = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.workflow.max_conflict_retries == 5, "file value should beat default")?;
            ensure(
                config.workflow.permission_matrix().employee_handoff_within_department,
                "env handoff flag should win over file",
            )?;
            ensure(config.notifications.max_attempts == 7, "env attempts should win over file")?;
            Ok(())
        })();

        clear_vars(&[
            "CASETRACK_DATABASE_URL",
            "CASETRACK_WORKFLOW_EMPLOYEE_HANDOFF_WITHIN_DEPARTMENT",
            "CASETRACK_NOTIFICATIONS_MAX_ATTEMPTS",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CASETRACK_RELAY_URL", "relay.internal");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("relay.url")
            );
            ensure(has_message, "validation failure should mention relay.url")
        })();

        clear_vars(&["CASETRACK_RELAY_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CASETRACK_NOTIFICATIONS_BATCH_SIZE", "lots");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "CASETRACK_NOTIFICATIONS_BATCH_SIZE",
                "error should name the offending variable",
            ),
            other => Err(format!("expected invalid env override, got {other:?}")),
        };

        clear_vars(&["CASETRACK_NOTIFICATIONS_BATCH_SIZE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CASETRACK_RELAY_TOKEN", "relay-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("relay-secret-value"),
                "debug output should not contain relay token",
            )
        })();

        clear_vars(&["CASETRACK_RELAY_TOKEN"]);
        result
    }
}
