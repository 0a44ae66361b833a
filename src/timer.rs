//! Authentication timer
//!
//! A connection gets a fixed window to log in. The timer task and the
//! login path race on one atomic [`AuthGuard`]; whichever resolves it first
//! wins and the other side backs off.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::types::SessionId;

const PENDING: u8 = 0;
const AUTHENTICATED: u8 = 1;
const EXPIRED: u8 = 2;

/// One-shot resolution shared by the timer and the login path
#[derive(Debug, Default)]
pub struct AuthGuard {
    state: AtomicU8,
    expired: Notify,
}

impl AuthGuard {
    /// Claim the guard for a successful login
    pub fn authenticate(&self) -> bool {
        self.resolve(AUTHENTICATED)
    }

    /// Claim the guard for the timer and wake the session
    pub fn expire(&self) -> bool {
        let won = self.resolve(EXPIRED);
        if won {
            self.expired.notify_one();
        }
        won
    }

    fn resolve(&self, outcome: u8) -> bool {
        self.state
            .compare_exchange(PENDING, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_expired(&self) -> bool {
        self.state.load(Ordering::Acquire) == EXPIRED
    }

    /// Resolves once the timer has won. Never resolves after a login.
    pub async fn expired(&self) {
        self.expired.notified().await;
    }
}

/// Per-session countdown to forced disconnect
#[derive(Debug)]
pub struct AuthTimer {
    guard: Arc<AuthGuard>,
    task: JoinHandle<()>,
}

impl AuthTimer {
    /// Start the countdown for `session`
    pub fn arm(timeout: Duration, session: SessionId) -> Self {
        let guard = Arc::new(AuthGuard::default());
        let task = tokio::spawn({
            let guard = Arc::clone(&guard);
            async move {
                tokio::time::sleep(timeout).await;
                if guard.expire() {
                    info!(session = %session, "Time is over ({:?}), stopping client", timeout);
                }
            }
        });
        Self { guard, task }
    }

    /// Stop the countdown because login succeeded
    ///
    /// Returns `false` if the timer already fired; the session must then
    /// not register itself.
    pub fn cancel(&self) -> bool {
        let won = self.guard.authenticate();
        if won {
            self.task.abort();
        }
        won
    }

    pub fn is_expired(&self) -> bool {
        self.guard.is_expired()
    }

    pub async fn expired(&self) {
        self.guard.expired().await;
    }
}

impl Drop for AuthTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const WINDOW: Duration = Duration::from_secs(120);

    #[tokio::test(start_paused = true)]
    async fn test_timer_expires_after_window() {
        let start = Instant::now();
        let timer = AuthTimer::arm(WINDOW, SessionId::new());

        timer.expired().await;

        assert!(start.elapsed() >= WINDOW);
        assert!(timer.is_expired());
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_expiry() {
        let timer = AuthTimer::arm(WINDOW, SessionId::new());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(!timer.is_expired());
    }

    #[test]
    fn test_guard_outcomes_are_exclusive() {
        let guard = AuthGuard::default();
        assert!(guard.expire());
        assert!(!guard.authenticate());
        assert!(guard.is_expired());

        let guard = AuthGuard::default();
        assert!(guard.authenticate());
        assert!(!guard.expire());
        assert!(!guard.is_expired());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_guard_race_has_single_winner() {
        for _ in 0..200 {
            let guard = Arc::new(AuthGuard::default());
            let login = tokio::spawn({
                let guard = Arc::clone(&guard);
                async move { guard.authenticate() }
            });
            let timeout = tokio::spawn({
                let guard = Arc::clone(&guard);
                async move { guard.expire() }
            });

            let (login, timeout) = (login.await.unwrap(), timeout.await.unwrap());
            assert!(login ^ timeout);
            assert_eq!(guard.is_expired(), timeout);
        }
    }
}
