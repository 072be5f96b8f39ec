use crate::config::types::AppConfig;

/// Redact sensitive fields in a config for safe display.
/// Replaces the private key passphrase with "***".
pub fn redact_config(cfg: &AppConfig) -> AppConfig {
    let mut redacted = cfg.clone();

    if redacted.relay.private_key_passphrase.is_some() {
        redacted.relay.private_key_passphrase = Some("***".to_string());
    }

    redacted
}
