use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    #[serde(rename = "session.rejected")]
    SessionRejected {
        timestamp: DateTime<Utc>,
        source_ip: String,
        reason: String,
    },
    #[serde(rename = "session.started")]
    SessionStarted {
        timestamp: DateTime<Utc>,
        session_id: String,
        host: String,
        username: String,
        auth_mode: String,
        source_ip: String,
    },
    #[serde(rename = "session.established")]
    SessionEstablished {
        timestamp: DateTime<Utc>,
        session_id: String,
        host: String,
        username: String,
        establish_ms: u64,
    },
    #[serde(rename = "session.failed")]
    SessionFailed {
        timestamp: DateTime<Utc>,
        session_id: String,
        host: String,
        username: String,
        reason: String,
        detail: String,
    },
    #[serde(rename = "session.ended")]
    SessionEnded {
        timestamp: DateTime<Utc>,
        session_id: String,
        host: String,
        username: String,
        duration_secs: u64,
        bytes_up: u64,
        bytes_down: u64,
        reason: String,
    },
}

impl AuditEvent {
    pub fn session_rejected(source_ip: &str, reason: &str) -> Self {
        Self::SessionRejected {
            timestamp: Utc::now(),
            source_ip: source_ip.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn session_started(
        session_id: &str,
        host: &str,
        username: &str,
        auth_mode: &str,
        source_ip: &str,
    ) -> Self {
        Self::SessionStarted {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            host: host.to_string(),
            username: username.to_string(),
            auth_mode: auth_mode.to_string(),
            source_ip: source_ip.to_string(),
        }
    }

    pub fn session_established(
        session_id: &str,
        host: &str,
        username: &str,
        establish_ms: u64,
    ) -> Self {
        Self::SessionEstablished {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            host: host.to_string(),
            username: username.to_string(),
            establish_ms,
        }
    }

    pub fn session_failed(
        session_id: &str,
        host: &str,
        username: &str,
        reason: &str,
        detail: &str,
    ) -> Self {
        Self::SessionFailed {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            host: host.to_string(),
            username: username.to_string(),
            reason: reason.to_string(),
            detail: detail.to_string(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn session_ended(
        session_id: &str,
        host: &str,
        username: &str,
        duration_secs: u64,
        bytes_up: u64,
        bytes_down: u64,
        reason: &str,
    ) -> Self {
        Self::SessionEnded {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            host: host.to_string(),
            username: username.to_string(),
            duration_secs,
            bytes_up,
            bytes_down,
            reason: reason.to_string(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionRejected { .. } => "session.rejected",
            Self::SessionStarted { .. } => "session.started",
            Self::SessionEstablished { .. } => "session.established",
            Self::SessionFailed { .. } => "session.failed",
            Self::SessionEnded { .. } => "session.ended",
        }
    }

    /// Failures and rejections get priority delivery.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::SessionRejected { .. } | Self::SessionFailed { .. }
        )
    }
}
