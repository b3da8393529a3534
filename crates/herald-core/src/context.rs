//! Cancellation scope for batch operations.

use herald_transport::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus an optional deadline.
///
/// Cloning shares the token: cancelling any clone cancels them all. Use
/// [`Context::child`] for a scope that can be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless asked to.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A child scope, cancelled with its parent, inheriting the deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child scope whose deadline is the earlier of the parent's and `timeout` from now.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    /// Cancel this scope and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this scope has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it completes, the scope is cancelled, or the deadline passes.
    ///
    /// `timeout` further bounds this call only.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] or [`TransportError::Timeout`]
    /// when the scope ends first, otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, timeout: Option<Duration>, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        if self.token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let deadline = match (self.deadline, timeout) {
            (Some(d), Some(t)) => Some(d.min(Instant::now() + t)),
            (Some(d), None) => Some(d),
            (None, Some(t)) => Some(Instant::now() + t),
            (None, None) => None,
        };

        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TransportError::Cancelled),
            _ = expired => Err(TransportError::Timeout),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::new();
        let value = ctx.run(None, async { Ok::<_, TransportError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ctx = Context::new();
        ctx.cancel();
        let err = ctx.run(None, async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout() {
        let ctx = Context::new();
        let err = ctx
            .run(Some(Duration::from_millis(50)), std::future::pending::<Result<(), _>>())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = Context::with_timeout(Duration::from_secs(1));
        let err = ctx
            .run(None, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_child_cancelled_with_parent() {
        let parent = Context::new();
        let child = parent.child();
        let other = parent.child();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(!other.is_cancelled());

        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_deadline_is_earliest() {
        let parent = Context::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
