use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use casetrack_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// Effective configuration, one line per key, with where each value came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value) in effective_values(&config) {
        let env_key = env_key_for(key_path);
        let source =
            field_source(key_path, &env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let notifications = &config.notifications;
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("workflow.max_conflict_retries", config.workflow.max_conflict_retries.to_string()),
        (
            "workflow.employee_handoff_within_department",
            config.workflow.employee_handoff_within_department.to_string(),
        ),
        ("notifications.max_attempts", notifications.max_attempts.to_string()),
        ("notifications.base_delay_secs", notifications.base_delay_secs.to_string()),
        ("notifications.backoff_multiplier", notifications.backoff_multiplier.to_string()),
        ("notifications.max_delay_secs", notifications.max_delay_secs.to_string()),
        ("notifications.poll_interval_ms", notifications.poll_interval_ms.to_string()),
        ("notifications.batch_size", notifications.batch_size.to_string()),
        ("notifications.email_enabled", notifications.email_enabled.to_string()),
        ("notifications.whatsapp_enabled", notifications.whatsapp_enabled.to_string()),
        ("relay.url", config.relay.url.clone().unwrap_or_else(|| "<unset>".to_string())),
        (
            "relay.token",
            config
                .relay
                .token
                .as_ref()
                .map(|token| redact_token(token.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("relay.timeout_secs", config.relay.timeout_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ]
}

fn env_key_for(key_path: &str) -> String {
    format!("CASETRACK_{}", key_path.replace('.', "_").to_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    ["casetrack.toml", "config/casetrack.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, env_key_for, redact_token};

    #[test]
    fn env_keys_follow_section_layout() {
        assert_eq!(env_key_for("relay.timeout_secs"), "CASETRACK_RELAY_TIMEOUT_SECS");
        assert_eq!(
            env_key_for("notifications.whatsapp_enabled"),
            "CASETRACK_NOTIFICATIONS_WHATSAPP_ENABLED"
        );
    }

    #[test]
    fn tokens_are_never_printed_in_full() {
        assert_eq!(redact_token("sk-relay-secret"), "sk-r***");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_detected_in_file() {
        let doc: toml::Value = "[relay]\nurl = \"https://relay.test\"".parse().expect("toml");
        assert!(contains_path(&doc, "relay.url"));
        assert!(!contains_path(&doc, "relay.token"));
    }
}
