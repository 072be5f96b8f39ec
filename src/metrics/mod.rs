pub mod collectors;

/// Byte direction labels: `up` is browser to SSH, `down` is SSH to browser.
pub mod directions {
    pub const UP: &str = "up";
    pub const DOWN: &str = "down";
}

use collectors::{AuthModeLabel, DirectionLabel, HttpDurationLabel, HttpRequestLabel, ReasonLabel};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::{Family, MetricConstructor};
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Constructor for HTTP request duration histograms with predefined buckets.
#[derive(Clone)]
pub struct HttpDurationHistogramBuilder;

impl MetricConstructor<Histogram> for HttpDurationHistogramBuilder {
    fn new_metric(&self) -> Histogram {
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s
        Histogram::new([0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0])
    }
}

/// Centralized metrics registry for the relay
pub struct MetricsRegistry {
    pub registry: Registry,
    pub sessions_total: Family<AuthModeLabel, Counter>,
    pub sessions_active: Gauge,
    pub sessions_established_total: Counter,
    pub session_failures_total: Family<ReasonLabel, Counter>,
    pub requests_rejected_total: Family<ReasonLabel, Counter>,
    pub bytes_total: Family<DirectionLabel, Counter>,
    /// Time from accept to shell open
    pub establish_duration_seconds: Histogram,
    pub session_duration_seconds: Histogram,
    pub audit_events_dropped: Counter,
    pub http_requests_total: Family<HttpRequestLabel, Counter>,
    pub http_request_duration_seconds:
        Family<HttpDurationLabel, Histogram, HttpDurationHistogramBuilder>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sessions_total = Family::<AuthModeLabel, Counter>::default();
        registry.register(
            "relay_sessions",
            "Sessions accepted since start, by auth mode",
            sessions_total.clone(),
        );

        let sessions_active = Gauge::default();
        registry.register(
            "relay_sessions_active",
            "Sessions currently in the registry",
            sessions_active.clone(),
        );

        let sessions_established_total = Counter::default();
        registry.register(
            "relay_sessions_established",
            "Sessions that reached an open shell",
            sessions_established_total.clone(),
        );

        let session_failures_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "relay_session_failures",
            "Sessions torn down by an error, by reason",
            session_failures_total.clone(),
        );

        let requests_rejected_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "relay_requests_rejected",
            "Upgrade requests rejected before a session was created",
            requests_rejected_total.clone(),
        );

        let bytes_total = Family::<DirectionLabel, Counter>::default();
        registry.register(
            "relay_bytes",
            "Bytes relayed, by direction",
            bytes_total.clone(),
        );

        // Buckets: 0.1s .. 30s (establish deadline)
        let establish_duration_seconds =
            Histogram::new([0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]);
        registry.register(
            "relay_establish_duration_seconds",
            "Time from accept to open shell",
            establish_duration_seconds.clone(),
        );

        // Buckets: 1s, 5s, 15s, 30s, 60s, 300s, 600s, 1800s, 3600s, 4h
        let session_duration_seconds = Histogram::new([
            1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 14400.0,
        ]);
        registry.register(
            "relay_session_duration_seconds",
            "Session lifetime in seconds",
            session_duration_seconds.clone(),
        );

        let audit_events_dropped = Counter::default();
        registry.register(
            "relay_audit_events_dropped",
            "Audit events dropped due to channel overflow",
            audit_events_dropped.clone(),
        );

        let http_requests_total = Family::<HttpRequestLabel, Counter>::default();
        registry.register(
            "relay_http_requests",
            "HTTP requests by method, route and status",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpDurationLabel, Histogram, HttpDurationHistogramBuilder>::new_with_constructor(
                HttpDurationHistogramBuilder,
            );
        registry.register(
            "relay_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        Self {
            registry,
            sessions_total,
            sessions_active,
            sessions_established_total,
            session_failures_total,
            requests_rejected_total,
            bytes_total,
            establish_duration_seconds,
            session_duration_seconds,
            audit_events_dropped,
            http_requests_total,
            http_request_duration_seconds,
        }
    }

    pub fn record_session_started(&self, auth_mode: &str) {
        self.sessions_total
            .get_or_create(&AuthModeLabel {
                auth_mode: auth_mode.to_string(),
            })
            .inc();
        self.sessions_active.inc();
    }

    pub fn record_session_established(&self, establish_secs: f64) {
        self.sessions_established_total.inc();
        self.establish_duration_seconds.observe(establish_secs);
    }

    pub fn record_session_ended(&self, duration_secs: f64) {
        self.sessions_active.dec();
        self.session_duration_seconds.observe(duration_secs);
    }

    pub fn record_session_failure(&self, reason: &str) {
        self.session_failures_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_request_rejected(&self, reason: &str) {
        self.requests_rejected_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_bytes(&self, direction: &str, bytes: u64) {
        self.bytes_total
            .get_or_create(&DirectionLabel {
                direction: direction.to_string(),
            })
            .inc_by(bytes);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16) {
        self.http_requests_total
            .get_or_create(&HttpRequestLabel {
                method: method.to_string(),
                path: path.to_string(),
                status: status.to_string(),
            })
            .inc();
    }

    pub fn record_http_request_duration(&self, method: &str, path: &str, duration_secs: f64) {
        self.http_request_duration_seconds
            .get_or_create(&HttpDurationLabel {
                method: method.to_string(),
                path: path.to_string(),
            })
            .observe(duration_secs);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
