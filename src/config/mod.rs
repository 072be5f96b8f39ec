pub mod env;
pub mod redact;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;
use types::AppConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Resolve the effective configuration the way the server starts.
///
/// An explicit path must exist. Without one, `config.toml` is used when
/// present, otherwise built-in defaults. Environment overrides are applied
/// last and the result is validated.
pub fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                load_config(default_path)?
            } else {
                AppConfig::default()
            }
        }
    };
    env::apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    check_config_file_permissions(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    parse_config(&content)
}

/// On Unix, warn if the config file is readable by group or others,
/// since it may hold the private key passphrase.
#[cfg(unix)]
fn check_config_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:04o}", mode & 0o7777),
                    "Config file is readable by group/others. \
                     Consider restricting permissions to 0600 if it contains a key passphrase."
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not check config file permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_file_permissions(_path: &Path) {}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_server(config)?;
    validate_relay(config)?;
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<()> {
    if config.server.listen.is_empty() {
        anyhow::bail!("server.listen must not be empty");
    }
    if !config.server.ws_path.starts_with('/') {
        anyhow::bail!(
            "server.ws_path must start with '/' (got '{}')",
            config.server.ws_path
        );
    }
    if config.server.ws_path == "/" || config.server.ws_path.starts_with("/api/") {
        anyhow::bail!(
            "server.ws_path '{}' collides with a built-in route",
            config.server.ws_path
        );
    }
    if config.metrics.enabled && config.metrics.listen.is_empty() {
        anyhow::bail!("metrics.listen must be set when metrics are enabled");
    }
    Ok(())
}

fn validate_relay(config: &AppConfig) -> Result<()> {
    let relay = &config.relay;
    if relay.ssh_port == 0 {
        anyhow::bail!("relay.ssh_port must be > 0");
    }
    if relay.establish_timeout == 0 {
        anyhow::bail!("relay.establish_timeout must be > 0");
    }
    if relay.default_username.trim().is_empty() {
        anyhow::bail!("relay.default_username must not be empty");
    }
    if relay.term.is_empty() {
        anyhow::bail!("relay.term must not be empty");
    }
    if relay.cols == 0 || relay.rows == 0 {
        anyhow::bail!(
            "relay.cols and relay.rows must be > 0 (got {}x{})",
            relay.cols,
            relay.rows
        );
    }
    if relay.outbound_queue_capacity == 0 {
        anyhow::bail!("relay.outbound_queue_capacity must be > 0");
    }
    Ok(())
}
