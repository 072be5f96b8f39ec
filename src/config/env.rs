//! Environment variable overrides.
//!
//! Applied on top of the file (or built-in defaults) so the relay can be
//! configured entirely from the environment in container deployments.
//! `PORT` is honoured for compatibility with PaaS-style launchers.

use crate::config::types::*;
use std::path::PathBuf;

pub fn apply_env_overrides(config: &mut AppConfig) -> anyhow::Result<()> {
    // Server overrides
    if let Some(v) = opt_env("PORT") {
        let port: u16 = v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid PORT '{v}': {e}"))?;
        config.server.listen = format!("0.0.0.0:{port}");
    }
    if let Some(v) = opt_env("RELAY_LISTEN") {
        config.server.listen = v;
    }
    if let Some(v) = opt_env("RELAY_WS_PATH") {
        config.server.ws_path = v;
    }
    config.server.shutdown_timeout =
        parse_env("RELAY_SHUTDOWN_TIMEOUT", config.server.shutdown_timeout);
    config.server.trust_forwarded_for =
        parse_bool_env("RELAY_TRUST_FORWARDED_FOR", config.server.trust_forwarded_for);

    // Relay overrides
    config.relay.ssh_port = parse_env("RELAY_SSH_PORT", config.relay.ssh_port);
    if let Some(v) = opt_env("RELAY_DEFAULT_USERNAME") {
        config.relay.default_username = v;
    }
    config.relay.establish_timeout =
        parse_env("RELAY_ESTABLISH_TIMEOUT", config.relay.establish_timeout);
    if let Some(v) = opt_env("RELAY_PRIVATE_KEY_PATH") {
        config.relay.private_key_path = PathBuf::from(v);
    }
    if let Some(v) = resolve_env_or_file("RELAY_PRIVATE_KEY_PASSPHRASE")? {
        config.relay.private_key_passphrase = Some(v);
    }
    config.relay.accept_any_host_key =
        parse_bool_env("RELAY_ACCEPT_ANY_HOST_KEY", config.relay.accept_any_host_key);
    if let Some(v) = opt_env("RELAY_KNOWN_HOSTS") {
        config.relay.known_hosts_path = Some(PathBuf::from(v));
    }
    config.relay.report_interval = parse_env("RELAY_REPORT_INTERVAL", config.relay.report_interval);

    // Logging overrides
    if let Some(v) = opt_env("RELAY_LOG_LEVEL") {
        config.logging.level = parse_log_level(&v)?;
    }
    if let Some(v) = opt_env("RELAY_LOG_FORMAT") {
        config.logging.format = parse_log_format(&v)?;
    }
    if let Some(v) = opt_env("RELAY_AUDIT_LOG_PATH") {
        config.logging.audit_log_path = Some(PathBuf::from(v));
    }
    config.logging.log_payloads = parse_bool_env("RELAY_LOG_PAYLOADS", config.logging.log_payloads);

    // Metrics overrides
    config.metrics.enabled = parse_bool_env("RELAY_METRICS_ENABLED", config.metrics.enabled);
    if let Some(v) = opt_env("RELAY_METRICS_LISTEN") {
        config.metrics.listen = v;
    }

    Ok(())
}

fn opt_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve a value from an env var, with _FILE fallback for Docker/K8s secrets.
/// Priority: direct env var > _FILE (read file content, trimmed) > None.
fn resolve_env_or_file(key: &str) -> anyhow::Result<Option<String>> {
    if let Some(val) = opt_env(key) {
        return Ok(Some(val));
    }
    let file_key = format!("{key}_FILE");
    if let Some(path) = opt_env(&file_key) {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading {file_key}={path}: {e}"))?;
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            anyhow::bail!("{file_key}={path} is empty");
        }
        return Ok(Some(trimmed));
    }
    Ok(None)
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    opt_env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    opt_env(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn parse_log_level(s: &str) -> anyhow::Result<LogLevel> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => anyhow::bail!("invalid log level: '{s}'"),
    }
}

fn parse_log_format(s: &str) -> anyhow::Result<LogFormat> {
    match s.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => anyhow::bail!("invalid log format: '{s}'"),
    }
}
