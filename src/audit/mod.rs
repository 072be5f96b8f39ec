pub mod events;

use events::AuditEvent;
use prometheus_client::metrics::counter::Counter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const AUDIT_CHANNEL_CAPACITY: usize = 10_000;

/// Asynchronous audit logger
pub struct AuditLogger {
    sender: mpsc::Sender<AuditEvent>,
    dropped_count: AtomicU64,
    dropped_metric: OnceLock<Counter>,
}

impl AuditLogger {
    pub fn new(log_path: Option<PathBuf>, max_size_bytes: u64, max_files: u32) -> Self {
        let (sender, receiver) = mpsc::channel(AUDIT_CHANNEL_CAPACITY);

        tokio::spawn(audit_writer_task(
            receiver,
            log_path,
            max_size_bytes,
            max_files,
        ));

        Self {
            sender,
            dropped_count: AtomicU64::new(0),
            dropped_metric: OnceLock::new(),
        }
    }

    /// Create a no-op audit logger for testing (no tokio runtime required).
    /// Events sent to this logger are silently dropped.
    pub fn new_noop() -> Self {
        let (sender, _receiver) = mpsc::channel(1);
        Self {
            sender,
            dropped_count: AtomicU64::new(0),
            dropped_metric: OnceLock::new(),
        }
    }

    /// Wire the Prometheus counter for dropped audit events.
    pub fn set_dropped_metric(&self, counter: Counter) {
        let _ = self.dropped_metric.set(counter);
    }

    /// Number of audit events dropped due to channel overflow
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn log_session_rejected(&self, source_ip: &str, reason: &str) {
        self.try_send(AuditEvent::session_rejected(source_ip, reason));
    }

    pub fn log_session_started(
        &self,
        session_id: &str,
        host: &str,
        username: &str,
        auth_mode: &str,
        source_ip: &str,
    ) {
        self.try_send(AuditEvent::session_started(
            session_id, host, username, auth_mode, source_ip,
        ));
    }

    pub fn log_session_established(
        &self,
        session_id: &str,
        host: &str,
        username: &str,
        establish_ms: u64,
    ) {
        self.try_send(AuditEvent::session_established(
            session_id,
            host,
            username,
            establish_ms,
        ));
    }

    pub fn log_session_failed(
        &self,
        session_id: &str,
        host: &str,
        username: &str,
        reason: &str,
        detail: &str,
    ) {
        self.try_send(AuditEvent::session_failed(
            session_id, host, username, reason, detail,
        ));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_session_ended(
        &self,
        session_id: &str,
        host: &str,
        username: &str,
        duration_secs: u64,
        bytes_up: u64,
        bytes_down: u64,
        reason: &str,
    ) {
        self.try_send(AuditEvent::session_ended(
            session_id,
            host,
            username,
            duration_secs,
            bytes_up,
            bytes_down,
            reason,
        ));
    }

    pub fn log_event(&self, event: AuditEvent) {
        self.try_send(event);
    }

    fn try_send(&self, event: AuditEvent) {
        let event = match self.sender.try_send(event) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(event)) => event,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.record_drop();
                return;
            }
        };

        // Failures get one more chance through a reserved slot
        if event.is_critical() {
            if let Ok(permit) = self.sender.try_reserve() {
                permit.send(event);
                return;
            }
        }
        self.record_drop();
    }

    fn record_drop(&self) {
        let dropped = self.dropped_count.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(counter) = self.dropped_metric.get() {
            counter.inc();
        }
        if dropped % 100 == 1 {
            warn!(
                total_dropped = dropped,
                "Audit events being dropped due to channel overflow"
            );
        }
    }
}

async fn open_append(path: &std::path::Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

async fn audit_writer_task(
    mut receiver: mpsc::Receiver<AuditEvent>,
    log_path: Option<PathBuf>,
    max_size_bytes: u64,
    max_files: u32,
) {
    let mut file = if let Some(path) = &log_path {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match open_append(path).await {
            Ok(f) => Some(f),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to open audit log");
                None
            }
        }
    } else {
        None
    };

    let mut current_size: u64 = match (&log_path, &file) {
        (Some(path), Some(_)) => tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .unwrap_or(0),
        _ => 0,
    };

    while let Some(event) = receiver.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize audit event");
                continue;
            }
        };
        debug!(event = %json, "Audit event");

        let Some(f) = file.as_mut() else {
            continue;
        };
        let line = format!("{}\n", json);
        if let Err(e) = f.write_all(line.as_bytes()).await {
            error!(error = %e, "Failed to write audit log");
            continue;
        }
        if let Err(e) = f.flush().await {
            error!(error = %e, "Failed to flush audit log");
        }
        current_size += line.len() as u64;

        if max_size_bytes > 0 && current_size >= max_size_bytes {
            if let Some(ref path) = log_path {
                drop(file.take());
                rotate_audit_files(path, max_files).await;
                match open_append(path).await {
                    Ok(new_file) => {
                        file = Some(new_file);
                        current_size = 0;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to reopen audit log after rotation");
                    }
                }
            }
        }
    }
}

/// Rotate audit log files: audit.json -> audit.json.1, audit.json.1 -> audit.json.2, etc.
async fn rotate_audit_files(path: &std::path::Path, max_files: u32) {
    for i in (1..max_files).rev() {
        let from = format!("{}.{}", path.display(), i);
        let to = format!("{}.{}", path.display(), i + 1);
        let _ = tokio::fs::rename(&from, &to).await;
    }
    let rotated = format!("{}.1", path.display());
    if let Err(e) = tokio::fs::rename(path, &rotated).await {
        error!(error = %e, "Failed to rotate audit log");
    }
}
