use super::{LiveSession, SessionSnapshot};
use crate::utils::format_duration;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionUpdate {
    /// Only a `true` value has an effect: `established` never reverts.
    pub established: Option<bool>,
    pub window: Option<(u32, u32)>,
}

/// Process-wide map of live sessions, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<LiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending session. Returns `None` if the id is already taken.
    pub fn insert(&self, session: LiveSession) -> Option<Arc<LiveSession>> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let session = Arc::new(session);
                slot.insert(Arc::clone(&session));
                Some(session)
            }
        }
    }

    /// Apply a partial update. Returns false when the id is not live.
    pub fn update(&self, id: &str, update: SessionUpdate) -> bool {
        let Some(session) = self.sessions.get(id) else {
            return false;
        };
        if update.established == Some(true) {
            session.mark_established();
        }
        if let Some((cols, rows)) = update.window {
            session.set_window(cols, rows);
        }
        true
    }

    pub fn remove(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.get(id).map(|s| Arc::clone(&s))
    }

    /// Snapshot of every live session, oldest first.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> = self.sessions.iter().map(|s| s.snapshot()).collect();
        all.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Emit one diagnostic line per live session.
    pub fn report(&self) {
        let sessions = self.snapshot();
        if sessions.is_empty() {
            return;
        }
        info!(count = sessions.len(), "Active sessions");
        for s in &sessions {
            info!(
                session_id = %s.id,
                host = %s.host,
                user = %s.username,
                established = s.established,
                duration = %format_duration(s.connection_duration),
                "Session alive"
            );
        }
    }
}

/// Periodic session report until `shutdown` fires.
pub fn spawn_report_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => registry.report(),
                _ = shutdown.cancelled() => break,
            }
        }
    })
}
