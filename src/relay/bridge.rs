use super::establish::RemoteShell;
use super::{LiveSession, SessionRegistry, SessionUpdate};
use crate::metrics::{directions, MetricsRegistry};
use crate::utils::payload_preview;
use futures_util::{Stream, StreamExt};
use russh::ChannelMsg;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PREVIEW_EDGE: usize = 50;

/// One outbound message toward the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }
}

/// One inbound event from the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Data(Vec<u8>),
    Closed,
}

/// Turns raw shell output into frames. Valid UTF-8 becomes text; a
/// multi-byte sequence split across chunks is held back until its tail
/// arrives; anything else goes out as binary, byte for byte.
#[derive(Debug, Default)]
pub struct Utf8Framer {
    pending: Vec<u8>,
}

impl Utf8Framer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Option<Frame> {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(chunk);
        if data.is_empty() {
            return None;
        }

        match std::str::from_utf8(&data) {
            Ok(_) => String::from_utf8(data).ok().map(Frame::Text),
            // Incomplete sequence at the very end: keep it for next time
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                self.pending = data.split_off(valid);
                if data.is_empty() {
                    None
                } else {
                    String::from_utf8(data).ok().map(Frame::Text)
                }
            }
            Err(_) => Some(Frame::Binary(data)),
        }
    }

    /// Flush held-back bytes at end of stream.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            None
        } else {
            Some(Frame::Binary(std::mem::take(&mut self.pending)))
        }
    }
}

/// Browser input received before the shell is open, replayed in order
/// once it is. Bytes past `limit` are dropped.
#[derive(Debug)]
pub struct PendingInput {
    buf: Vec<u8>,
    limit: usize,
    dropped: usize,
}

impl PendingInput {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Returns how many bytes of `bytes` did not fit.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let room = self.limit.saturating_sub(self.buf.len());
        let kept = room.min(bytes.len());
        self.buf.extend_from_slice(&bytes[..kept]);
        let over = bytes.len() - kept;
        self.dropped += over;
        over
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Why the bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEnd {
    /// Remote shell closed its channel.
    ShellClosed { exit_status: Option<u32> },
    /// Browser closed the WebSocket (or its queue went away).
    ClientClosed,
    /// Server shutdown.
    Cancelled,
    /// No traffic in either direction for the inactivity timeout.
    Idle,
}

impl BridgeEnd {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ShellClosed { .. } => "shell_closed",
            Self::ClientClosed => "client_closed",
            Self::Cancelled => "shutdown",
            Self::Idle => "idle",
        }
    }
}

/// Per-session relay between the browser and the remote shell channel.
pub struct Bridge {
    pub session: Arc<LiveSession>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Option<Arc<MetricsRegistry>>,
    pub log_payloads: bool,
    pub inactivity_timeout: Option<Duration>,
}

impl Bridge {
    /// Relay until either side closes. `pending` is written to the shell
    /// before anything newer from `inbound`. Shell output is pushed into
    /// `out` with `await`, so a full queue stops reads from the channel.
    pub async fn run<S>(
        &self,
        shell: &mut RemoteShell,
        pending: PendingInput,
        inbound: &mut S,
        out: &mpsc::Sender<Frame>,
        cancel: &CancellationToken,
    ) -> BridgeEnd
    where
        S: Stream<Item = Inbound> + Unpin,
    {
        let mut framer = Utf8Framer::new();
        let mut exit_status = None;

        let early = std::mem::take(&mut shell.early_output);
        if !early.is_empty() && !self.forward_down(&mut framer, &early, out).await {
            return BridgeEnd::ClientClosed;
        }

        if pending.dropped() > 0 {
            warn!(session_id = %self.session.id, dropped = pending.dropped(), "Early input over buffer limit dropped");
        }
        let pending = pending.into_bytes();
        if !pending.is_empty() && !self.forward_up(shell, &pending).await {
            return BridgeEnd::ShellClosed { exit_status: None };
        }

        let idle_after = self.inactivity_timeout.unwrap_or(Duration::from_secs(86_400));
        let idle = tokio::time::sleep(idle_after);
        tokio::pin!(idle);

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break BridgeEnd::Cancelled,
                _ = &mut idle, if self.inactivity_timeout.is_some() => break BridgeEnd::Idle,
                msg = shell.channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                        idle.as_mut().reset(Instant::now() + idle_after);
                        if !self.forward_down(&mut framer, &data, out).await {
                            break BridgeEnd::ClientClosed;
                        }
                    }
                    Some(ChannelMsg::WindowChange { col_width, row_height, .. }) => {
                        debug!(session_id = %self.session.id, cols = col_width, rows = row_height, "Terminal resized");
                        self.registry.update(
                            &self.session.id,
                            SessionUpdate {
                                window: Some((col_width, row_height)),
                                ..Default::default()
                            },
                        );
                    }
                    Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                        info!(session_id = %self.session.id, exit_status = status, "Remote shell exited");
                        exit_status = Some(status);
                    }
                    Some(ChannelMsg::Eof) => {
                        debug!(session_id = %self.session.id, "Remote shell sent EOF");
                    }
                    Some(ChannelMsg::Close) | None => break BridgeEnd::ShellClosed { exit_status },
                    Some(_) => {}
                },
                msg = inbound.next() => match msg {
                    Some(Inbound::Data(bytes)) => {
                        idle.as_mut().reset(Instant::now() + idle_after);
                        if !self.forward_up(shell, &bytes).await {
                            break BridgeEnd::ShellClosed { exit_status };
                        }
                    }
                    Some(Inbound::Closed) | None => break BridgeEnd::ClientClosed,
                },
            }
        };

        if let Some(frame) = framer.finish() {
            let _ = out.send(frame).await;
        }
        end
    }

    /// Returns false once the shell channel refuses writes.
    async fn forward_up(&self, shell: &RemoteShell, data: &[u8]) -> bool {
        if self.log_payloads {
            debug!(session_id = %self.session.id, data = %payload_preview(data, PREVIEW_EDGE), "WS -> SSH");
        }
        if let Err(e) = shell.channel.data(data).await {
            warn!(session_id = %self.session.id, error = %e, "Write to shell failed");
            return false;
        }
        self.count(directions::UP, data.len());
        true
    }

    /// Returns false once the outbound queue is gone.
    async fn forward_down(
        &self,
        framer: &mut Utf8Framer,
        data: &[u8],
        out: &mpsc::Sender<Frame>,
    ) -> bool {
        if self.log_payloads {
            debug!(session_id = %self.session.id, data = %payload_preview(data, PREVIEW_EDGE), "SSH -> WS");
        }
        self.count(directions::DOWN, data.len());
        match framer.push(data) {
            Some(frame) => out.send(frame).await.is_ok(),
            None => !out.is_closed(),
        }
    }

    fn count(&self, direction: &str, n: usize) {
        let n = n as u64;
        if direction == directions::UP {
            self.session.add_bytes_up(n);
        } else {
            self.session.add_bytes_down(n);
        }
        if let Some(ref metrics) = self.metrics {
            metrics.record_bytes(direction, n);
        }
    }
}
