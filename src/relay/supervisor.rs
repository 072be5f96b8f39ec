use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const PENDING: u8 = 0;
const ESTABLISHED: u8 = 1;
const TIMED_OUT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Pending,
    Established,
    TimedOut,
}

/// Establish-phase watchdog for one session.
///
/// State moves `Pending -> Established` or `Pending -> TimedOut`, never both
/// and never back. Whichever of [`disarm`](Self::disarm) and
/// [`fire`](Self::fire) wins the race decides the outcome; the loser is a
/// no-op.
pub struct TimeoutSupervisor {
    state: AtomicU8,
    deadline: Instant,
    timeout: Duration,
}

impl TimeoutSupervisor {
    /// Arm the deadline now.
    pub fn arm(timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> SupervisorState {
        match self.state.load(Ordering::Acquire) {
            PENDING => SupervisorState::Pending,
            ESTABLISHED => SupervisorState::Established,
            _ => SupervisorState::TimedOut,
        }
    }

    /// Cancel the deadline because the shell opened. Returns false if the
    /// deadline had already fired.
    pub fn disarm(&self) -> bool {
        self.transition(ESTABLISHED) || self.state() == SupervisorState::Established
    }

    /// Force the timeout. Returns true only for the call that moved the
    /// state out of `Pending`.
    pub fn fire(&self) -> bool {
        self.transition(TIMED_OUT)
    }

    /// Resolves at the deadline, or never once disarmed.
    pub async fn expired(&self) {
        if self.state() != SupervisorState::Pending {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep_until(self.deadline).await;
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
