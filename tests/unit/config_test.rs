use std::io::Write;
use std::path::PathBuf;
use webssh_relay::config::types::{LogFormat, LogLevel};
use webssh_relay::config::{load_config, parse_config, redact::redact_config};

#[test]
fn test_defaults_match_documented_values() {
    let config = parse_config("").unwrap();
    assert_eq!(config.server.listen, "0.0.0.0:8080");
    assert_eq!(config.server.ws_path, "/ws");
    assert!(config.server.status_page);
    assert_eq!(config.relay.ssh_port, 22);
    assert_eq!(config.relay.default_username, "myconsole");
    assert_eq!(config.relay.establish_timeout, 30);
    assert_eq!(config.relay.term, "xterm");
    assert_eq!((config.relay.cols, config.relay.rows), (80, 24));
    assert_eq!(config.relay.private_key_path, PathBuf::from("relay_key"));
    assert_eq!(config.logging.level, LogLevel::Info);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.logging.audit_log_path.is_none());
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let config = parse_config(
        r##"
[relay]
ssh_port = 2200

[logging]
format = "json"
"##,
    )
    .unwrap();
    assert_eq!(config.relay.ssh_port, 2200);
    assert_eq!(config.relay.establish_timeout, 30);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_rejects_ws_path_without_slash() {
    let err = parse_config("[server]\nws_path = \"ws\"\n").unwrap_err();
    assert!(err.to_string().contains("ws_path"), "{err}");
}

#[test]
fn test_rejects_ws_path_on_builtin_routes() {
    assert!(parse_config("[server]\nws_path = \"/\"\n").is_err());
    assert!(parse_config("[server]\nws_path = \"/api/shell\"\n").is_err());
}

#[test]
fn test_rejects_zero_values() {
    assert!(parse_config("[relay]\nssh_port = 0\n").is_err());
    assert!(parse_config("[relay]\nestablish_timeout = 0\n").is_err());
    assert!(parse_config("[relay]\ncols = 0\n").is_err());
    assert!(parse_config("[relay]\noutbound_queue_capacity = 0\n").is_err());
}

#[test]
fn test_rejects_unknown_log_level() {
    assert!(parse_config("[logging]\nlevel = \"loud\"\n").is_err());
}

#[test]
fn test_load_config_from_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"[server]\nlisten = \"127.0.0.1:9999\"\n").unwrap();
    f.flush().unwrap();

    let config = load_config(f.path()).unwrap();
    assert_eq!(config.server.listen, "127.0.0.1:9999");
}

#[test]
fn test_load_config_missing_file_fails() {
    let err = load_config(std::path::Path::new("/nonexistent/relay.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/relay.toml"), "{err}");
}

#[test]
fn test_redacted_config_hides_passphrase_only() {
    let config = parse_config(
        r##"
[relay]
private_key_passphrase = "open sesame"
default_username = "ops"
"##,
    )
    .unwrap();
    let redacted = redact_config(&config);
    assert_eq!(redacted.relay.private_key_passphrase.as_deref(), Some("***"));
    assert_eq!(redacted.relay.default_username, "ops");

    let rendered = toml::to_string(&redacted).unwrap();
    assert!(!rendered.contains("open sesame"));
}
