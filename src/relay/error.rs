use thiserror::Error;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Session-level failures. Each one ends exactly one session.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("connection timed out after {0}s")]
    Timeout(u64),

    #[error("private key not found: {0}")]
    KeyNotFound(String),

    #[error("private key unreadable: {0}")]
    KeyUnreadable(String),

    #[error("{0}")]
    Connect(String),

    #[error("host key rejected for {0}")]
    HostKeyRejected(String),

    #[error("{0}")]
    AuthRejected(String),

    #[error("{0}")]
    Shell(String),

    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    /// Stable label for metrics and audit records.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::Timeout(_) => "timeout",
            Self::KeyNotFound(_) => "key_not_found",
            Self::KeyUnreadable(_) => "key_unreadable",
            Self::Connect(_) => "connect",
            Self::HostKeyRejected(_) => "host_key_rejected",
            Self::AuthRejected(_) => "auth_rejected",
            Self::Shell(_) => "shell",
            Self::Internal(_) => "internal",
        }
    }

    /// Red terminal line shown to the browser before the socket closes.
    pub fn notice(&self) -> String {
        let text = match self {
            Self::MissingParameter(name) => format!("Error: missing {} parameter", name),
            Self::Timeout(_) => "Error: connection timed out".to_string(),
            Self::KeyNotFound(path) => format!("SSH connection error: key not found ({})", path),
            Self::KeyUnreadable(detail) => {
                format!("SSH connection error: key unreadable ({})", detail)
            }
            Self::Connect(detail) => format!("SSH connection error: {}", detail),
            Self::HostKeyRejected(host) => {
                format!("SSH connection error: host key verification failed for {}", host)
            }
            Self::AuthRejected(detail) => format!("SSH connection error: {}", detail),
            Self::Shell(detail) => format!("Failed to start shell: {}", detail),
            Self::Internal(detail) => format!("Server error: {}", detail),
        };
        colored(RED, &text)
    }
}

impl From<russh::Error> for RelayError {
    fn from(e: russh::Error) -> Self {
        Self::Connect(e.to_string())
    }
}

fn colored(color: &str, text: &str) -> String {
    format!("{}{}{}\r\n", color, text, RESET)
}

pub fn established_notice() -> String {
    colored(GREEN, "SSH connection established")
}

pub fn ended_notice() -> String {
    colored(RED, "SSH session ended")
}

pub fn keyboard_interactive_notice() -> String {
    colored(
        YELLOW,
        "Warning: server is requesting keyboard-interactive authentication",
    )
}

/// Userauth banner lines, CRLF-normalized.
pub fn banner_notice(banner: &str) -> String {
    let body = banner.trim_end_matches(['\r', '\n']).replace("\r\n", "\n");
    colored(CYAN, &body.replace('\n', "\r\n"))
}
