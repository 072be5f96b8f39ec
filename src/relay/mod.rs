pub mod bridge;
pub mod credentials;
pub mod error;
pub mod establish;
pub mod registry;
pub mod session;
pub mod supervisor;

pub use error::RelayError;
pub use registry::{SessionRegistry, SessionUpdate};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// How a session authenticates to the remote host. Chosen once at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    Password,
    PrivateKey,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::PrivateKey => "privateKey",
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of a live session (status API and periodic report).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub host: String,
    pub username: String,
    pub auth_mode: AuthMode,
    pub client_address: String,
    pub established: bool,
    pub connected_at: DateTime<Utc>,
    /// Whole seconds since accept
    pub connection_duration: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<(u32, u32)>,
}

/// Live session state tracked at runtime. Identity fields are immutable;
/// everything that changes during the session is atomic so concurrent
/// updates never need the registry lock.
pub struct LiveSession {
    pub id: String,
    pub host: String,
    pub username: String,
    pub auth_mode: AuthMode,
    pub client_address: String,
    pub connected_at: DateTime<Utc>,
    pub started: Instant,
    established: AtomicBool,
    pub bytes_up: AtomicU64,
    pub bytes_down: AtomicU64,
    window_cols: AtomicU32,
    window_rows: AtomicU32,
}

impl LiveSession {
    pub fn new(
        id: String,
        host: String,
        username: String,
        auth_mode: AuthMode,
        client_address: String,
    ) -> Self {
        Self {
            id,
            host,
            username,
            auth_mode,
            client_address,
            connected_at: Utc::now(),
            started: Instant::now(),
            established: AtomicBool::new(false),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            window_cols: AtomicU32::new(0),
            window_rows: AtomicU32::new(0),
        }
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Flip `established` to true. Returns false if it already was.
    pub fn mark_established(&self) -> bool {
        self.established
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn set_window(&self, cols: u32, rows: u32) {
        self.window_cols.store(cols, Ordering::Relaxed);
        self.window_rows.store(rows, Ordering::Relaxed);
    }

    pub fn window(&self) -> Option<(u32, u32)> {
        let cols = self.window_cols.load(Ordering::Relaxed);
        let rows = self.window_rows.load(Ordering::Relaxed);
        (cols > 0 && rows > 0).then_some((cols, rows))
    }

    pub fn add_bytes_up(&self, n: u64) {
        self.bytes_up.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_down(&self, n: u64) {
        self.bytes_down.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            host: self.host.clone(),
            username: self.username.clone(),
            auth_mode: self.auth_mode,
            client_address: self.client_address.clone(),
            established: self.is_established(),
            connected_at: self.connected_at,
            connection_duration: self.started.elapsed().as_secs(),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
            window: self.window(),
        }
    }
}
