//! Job deadlines
//!
//! A job carries one deadline from admission to its terminal state. The same
//! deadline is handed to every subprocess spawned on the job's behalf, and it
//! can be cancelled early so a running subprocess is killed rather than
//! merely abandoned.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Wall-clock budget of one job
///
/// Clones share the cancellation signal.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    /// A deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            token: CancellationToken::new(),
        }
    }

    /// Fires the deadline immediately for every clone
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.at
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        if self.token.is_cancelled() {
            return Duration::ZERO;
        }
        self.at.saturating_duration_since(Instant::now())
    }

    /// Resolves when the deadline passes or is cancelled
    pub async fn expired(&self) {
        tokio::select! {
            _ = tokio::time::sleep_until(self.at) => {}
            _ = self.token.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_budget() {
        let deadline = Deadline::after(Duration::from_secs(15));
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::from_secs(15));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(5));

        deadline.expired().await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reaches_clones() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let clone = deadline.clone();

        deadline.cancel();

        clone.expired().await;
        assert!(clone.is_expired());
        assert_eq!(clone.remaining(), Duration::ZERO);
    }
}
