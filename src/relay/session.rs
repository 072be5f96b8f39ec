use super::bridge::{Bridge, BridgeEnd, Frame, Inbound, PendingInput};
use super::credentials;
use super::error::ended_notice;
use super::establish::{establish, EstablishRequest};
use super::supervisor::TimeoutSupervisor;
use super::{AuthMode, LiveSession, RelayError, SessionRegistry, SessionUpdate};
use crate::context::AppContext;
use crate::ssh::HostKeyPolicy;
use crate::utils::{format_bytes, generate_session_id};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Per queued frame, bytes of early browser input held while the shell opens.
const PENDING_FRAME_BYTES: usize = 4096;

/// Upgrade request query string.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub host: Option<String>,
    pub username: Option<String>,
    pub use_password: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectQuery")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("use_password", &self.use_password)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Validated per-session parameters.
pub struct ConnectParams {
    pub host: String,
    pub username: String,
    /// Present only when password auth was requested.
    pub password: Option<Zeroizing<String>>,
}

impl ConnectParams {
    pub fn auth_mode(&self) -> AuthMode {
        if self.password.is_some() {
            AuthMode::Password
        } else {
            AuthMode::PrivateKey
        }
    }
}

impl ConnectQuery {
    /// Empty strings count as absent. `usePassword` must be exactly `true`.
    pub fn into_params(self, default_username: &str) -> Result<ConnectParams, RelayError> {
        let host = self
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or(RelayError::MissingParameter("host"))?;
        let username = self
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| default_username.to_string());

        let password = if self.use_password.as_deref() == Some("true") {
            let password = self
                .password
                .ok_or(RelayError::MissingParameter("password"))?;
            Some(Zeroizing::new(password))
        } else {
            None
        };

        Ok(ConnectParams {
            host,
            username,
            password,
        })
    }
}

/// How a session ended.
#[derive(Debug)]
enum Outcome {
    Failed(RelayError),
    Closed(&'static str),
}

/// Owns the registry entry for one session. `finish` is the single teardown
/// entry point; `Drop` covers a task that unwinds before reaching it.
struct SessionGuard {
    ctx: Arc<AppContext>,
    session: Arc<LiveSession>,
    finished: bool,
}

impl SessionGuard {
    fn finish(&mut self, outcome: &Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;

        let s = &self.session;
        self.ctx.registry.remove(&s.id);
        let elapsed = s.started.elapsed();
        self.ctx.metrics.record_session_ended(elapsed.as_secs_f64());

        match outcome {
            Outcome::Failed(e) => {
                self.ctx.metrics.record_session_failure(e.reason());
                self.ctx
                    .audit
                    .log_session_failed(&s.id, &s.host, &s.username, e.reason(), &e.to_string());
                warn!(
                    session_id = %s.id,
                    host = %s.host,
                    user = %s.username,
                    reason = e.reason(),
                    error = %e,
                    "{}",
                    failure_message(e)
                );
            }
            Outcome::Closed(reason) => {
                let bytes_up = s.bytes_up.load(std::sync::atomic::Ordering::Relaxed);
                let bytes_down = s.bytes_down.load(std::sync::atomic::Ordering::Relaxed);
                self.ctx.audit.log_session_ended(
                    &s.id,
                    &s.host,
                    &s.username,
                    elapsed.as_secs(),
                    bytes_up,
                    bytes_down,
                    reason,
                );
                info!(
                    session_id = %s.id,
                    host = %s.host,
                    user = %s.username,
                    bytes_up,
                    bytes_down,
                    total = %format_bytes(bytes_up + bytes_down),
                    duration_ms = elapsed.as_millis() as u64,
                    reason = *reason,
                    "Session completed"
                );
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(&Outcome::Failed(RelayError::Internal(
                "session task aborted".to_string(),
            )));
        }
    }
}

fn failure_message(e: &RelayError) -> &'static str {
    match e {
        RelayError::MissingParameter(_) => "Request rejected",
        RelayError::Timeout(_) => "Establish timed out",
        RelayError::KeyNotFound(_) => "Private key not found",
        RelayError::KeyUnreadable(_) => "Private key unreadable",
        RelayError::Connect(_) => "SSH connect failed",
        RelayError::HostKeyRejected(_) => "SSH host key rejected",
        RelayError::AuthRejected(_) => "SSH auth failed",
        RelayError::Shell(_) => "Shell request failed",
        RelayError::Internal(_) => "Session aborted",
    }
}

/// Refuse a request before any session exists: one notice, then the caller
/// drops `out` and the socket closes.
pub async fn reject(
    ctx: &AppContext,
    err: RelayError,
    client_address: &str,
    out: &mpsc::Sender<Frame>,
) {
    let reason = err.reason();
    if matches!(err, RelayError::MissingParameter("host")) {
        warn!(client_ip = %client_address, reason, "Request rejected: missing host");
    } else {
        warn!(client_ip = %client_address, reason, error = %err, "Request rejected");
    }
    ctx.audit.log_session_rejected(client_address, reason);
    ctx.metrics.record_request_rejected(reason);
    if out.send(Frame::Text(err.notice())).await.is_err() {
        debug!(client_ip = %client_address, "Client gone before rejection notice");
    }
}

/// Insert a pending entry, regenerating the id on collision.
fn register(
    registry: &SessionRegistry,
    params: &ConnectParams,
    client_address: &str,
) -> Arc<LiveSession> {
    loop {
        let candidate = LiveSession::new(
            generate_session_id(),
            params.host.clone(),
            params.username.clone(),
            params.auth_mode(),
            client_address.to_string(),
        );
        if let Some(session) = registry.insert(candidate) {
            return session;
        }
        debug!("Session id collision, regenerating");
    }
}

/// Run one relay session from accept to teardown.
///
/// `inbound` yields browser messages; frames pushed into `out` go to the
/// browser, and dropping `out` closes the socket.
pub async fn run_session<S>(
    ctx: Arc<AppContext>,
    mut params: ConnectParams,
    client_address: String,
    mut inbound: S,
    out: mpsc::Sender<Frame>,
) where
    S: Stream<Item = Inbound> + Unpin,
{
    let session = register(&ctx.registry, &params, &client_address);
    let mut guard = SessionGuard {
        ctx: Arc::clone(&ctx),
        session: Arc::clone(&session),
        finished: false,
    };

    info!(
        session_id = %session.id,
        host = %session.host,
        user = %session.username,
        client_ip = %client_address,
        auth_mode = %session.auth_mode,
        "Session started"
    );
    ctx.audit.log_session_started(
        &session.id,
        &session.host,
        &session.username,
        session.auth_mode.as_str(),
        &client_address,
    );
    ctx.metrics.record_session_started(session.auth_mode.as_str());

    let outcome = drive(&ctx, &session, &mut params, &mut inbound, &out).await;

    match &outcome {
        Outcome::Failed(e) => {
            let _ = out.send(Frame::Text(e.notice())).await;
        }
        Outcome::Closed(reason) if *reason != BridgeEnd::ClientClosed.reason() => {
            let _ = out.send(Frame::Text(ended_notice())).await;
        }
        Outcome::Closed(_) => {}
    }
    guard.finish(&outcome);
    drop(out);
}

async fn drive<S>(
    ctx: &Arc<AppContext>,
    session: &Arc<LiveSession>,
    params: &mut ConnectParams,
    inbound: &mut S,
    out: &mpsc::Sender<Frame>,
) -> Outcome
where
    S: Stream<Item = Inbound> + Unpin,
{
    let cfg = &ctx.config.relay;
    let supervisor = TimeoutSupervisor::arm(Duration::from_secs(cfg.establish_timeout));
    let cancel = ctx.shutdown.child_token();

    let strategy = match credentials::resolve(
        params.password.take(),
        &cfg.private_key_path,
        cfg.private_key_passphrase.as_deref(),
    )
    .await
    {
        Ok(strategy) => strategy,
        Err(e) => return Outcome::Failed(e),
    };

    let req = EstablishRequest {
        session_id: session.id.clone(),
        host: session.host.clone(),
        port: cfg.ssh_port,
        username: session.username.clone(),
        host_key_policy: if cfg.accept_any_host_key {
            HostKeyPolicy::AcceptAny
        } else {
            HostKeyPolicy::KnownHosts(cfg.known_hosts_path.clone())
        },
        keepalive_interval: (cfg.keepalive_interval > 0)
            .then(|| Duration::from_secs(cfg.keepalive_interval)),
        term: cfg.term.clone(),
        cols: cfg.cols,
        rows: cfg.rows,
    };

    let mut pending = PendingInput::new(cfg.outbound_queue_capacity * PENDING_FRAME_BYTES);
    let establishing = establish(&req, &strategy, out);
    tokio::pin!(establishing);
    let mut shell = loop {
        tokio::select! {
            res = &mut establishing => match res {
                Ok(shell) => break shell,
                Err(e) => return Outcome::Failed(e),
            },
            _ = supervisor.expired() => {
                if supervisor.fire() {
                    return Outcome::Failed(RelayError::Timeout(supervisor.timeout().as_secs()));
                }
            }
            msg = inbound.next() => match msg {
                Some(Inbound::Data(bytes)) => {
                    let over = pending.push(&bytes);
                    debug!(session_id = %session.id, len = bytes.len(), buffered = pending.len(), over, "Input held until shell opens");
                }
                Some(Inbound::Closed) | None => return Outcome::Closed(BridgeEnd::ClientClosed.reason()),
            },
            _ = cancel.cancelled() => return Outcome::Closed(BridgeEnd::Cancelled.reason()),
        }
    };

    supervisor.disarm();
    ctx.registry.update(
        &session.id,
        SessionUpdate {
            established: Some(true),
            ..Default::default()
        },
    );
    let establish_time = session.started.elapsed();
    info!(
        session_id = %session.id,
        host = %session.host,
        user = %session.username,
        duration_ms = establish_time.as_millis() as u64,
        "Shell opened"
    );
    ctx.audit.log_session_established(
        &session.id,
        &session.host,
        &session.username,
        establish_time.as_millis() as u64,
    );
    ctx.metrics
        .record_session_established(establish_time.as_secs_f64());

    let bridge = Bridge {
        session: Arc::clone(session),
        registry: Arc::clone(&ctx.registry),
        metrics: Some(Arc::clone(&ctx.metrics)),
        log_payloads: ctx.config.logging.log_payloads,
        inactivity_timeout: (cfg.inactivity_timeout > 0)
            .then(|| Duration::from_secs(cfg.inactivity_timeout)),
    };
    let end = bridge.run(&mut shell, pending, inbound, out, &cancel).await;
    if let BridgeEnd::ShellClosed {
        exit_status: Some(code),
    } = end
    {
        debug!(session_id = %session.id, exit_status = code, "Shell channel closed");
    }

    if tokio::time::timeout(Duration::from_secs(2), shell.shutdown())
        .await
        .is_err()
    {
        debug!(session_id = %session.id, "SSH disconnect timed out");
    }
    Outcome::Closed(end.reason())
}
