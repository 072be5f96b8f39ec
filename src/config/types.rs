use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Log level enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Inbound HTTP/WebSocket listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path of the WebSocket upgrade route
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Seconds to wait for live sessions to drain before forcing exit
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Serve the HTML status page on `/`
    #[serde(default = "default_true")]
    pub status_page: bool,
    /// Take the client address from the first `X-Forwarded-For` entry when present.
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ws_path: default_ws_path(),
            shutdown_timeout: default_shutdown_timeout(),
            status_page: true,
            trust_forwarded_for: true,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Outbound SSH side of every session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// Username used when the request carries none
    #[serde(default = "default_username")]
    pub default_username: String,
    /// Seconds a session may stay un-established before it is aborted
    #[serde(default = "default_establish_timeout")]
    pub establish_timeout: u64,
    /// Private key used for key authentication (OpenSSH or PKCS#8 PEM)
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,
    pub private_key_passphrase: Option<String>,
    /// Accept every remote host key. Development only.
    #[serde(default)]
    pub accept_any_host_key: bool,
    /// known_hosts file checked when host keys are verified (default: ~/.ssh/known_hosts)
    pub known_hosts_path: Option<PathBuf>,
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_cols")]
    pub cols: u32,
    #[serde(default = "default_rows")]
    pub rows: u32,
    /// Seconds between live-session reports (0 = disabled)
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Maximum frames queued toward the browser per session
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// SSH keepalive interval in seconds (0 = disabled)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
    /// Close established sessions idle for this many seconds (0 = disabled)
    #[serde(default)]
    pub inactivity_timeout: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ssh_port: default_ssh_port(),
            default_username: default_username(),
            establish_timeout: default_establish_timeout(),
            private_key_path: default_private_key_path(),
            private_key_passphrase: None,
            accept_any_host_key: false,
            known_hosts_path: None,
            term: default_term(),
            cols: default_cols(),
            rows: default_rows(),
            report_interval: default_report_interval(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            keepalive_interval: default_keepalive_interval(),
            inactivity_timeout: 0,
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_username() -> String {
    "myconsole".to_string()
}

fn default_establish_timeout() -> u64 {
    30
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("relay_key")
}

fn default_term() -> String {
    "xterm".to_string()
}

fn default_cols() -> u32 {
    80
}

fn default_rows() -> u32 {
    24
}

fn default_report_interval() -> u64 {
    60
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_keepalive_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    pub audit_log_path: Option<PathBuf>,
    #[serde(default = "default_audit_max_size_mb")]
    pub audit_max_size_mb: u64,
    #[serde(default = "default_audit_max_files")]
    pub audit_max_files: u32,
    /// Log previews of relayed data at debug level
    #[serde(default)]
    pub log_payloads: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            audit_log_path: None,
            audit_max_size_mb: default_audit_max_size_mb(),
            audit_max_files: default_audit_max_files(),
            log_payloads: false,
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_audit_max_size_mb() -> u64 {
    100
}

fn default_audit_max_files() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9090".to_string()
}
