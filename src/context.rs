use crate::audit::AuditLogger;
use crate::config::types::AppConfig;
use crate::metrics::MetricsRegistry;
use crate::relay::SessionRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared application context, replacing scattered Arc parameters
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
    pub audit: Arc<AuditLogger>,
    pub metrics: Arc<MetricsRegistry>,
    /// Cancelled on shutdown; every session holds a child token.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppContext {
    /// Build a context and wire the audit drop counter into metrics.
    /// Must be called inside a tokio runtime (the audit writer is spawned).
    pub fn new(config: AppConfig) -> Self {
        let audit = AuditLogger::new(
            config.logging.audit_log_path.clone(),
            config.logging.audit_max_size_mb * 1024 * 1024,
            config.logging.audit_max_files,
        );
        let metrics = Arc::new(MetricsRegistry::new());
        audit.set_dropped_metric(metrics.audit_events_dropped.clone());

        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            audit: Arc::new(audit),
            metrics,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }
}
