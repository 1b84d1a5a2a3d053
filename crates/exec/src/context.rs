//! Cancellation and deadlines for running steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;

/// Carries cancellation and an optional deadline down the step tree.
///
/// Cloning is cheap and clones share the same cancellation state. Derived
/// contexts ([`StepContext::child`], [`StepContext::with_timeout`]) are
/// canceled with their parent but can be canceled on their own.
#[derive(Clone, Debug)]
pub struct StepContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    deadline: Option<Instant>,
    expired: AtomicBool,
    parent: Option<StepContext>,
}

impl StepContext {
    /// A fresh root context that is never canceled unless asked to.
    pub fn background() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// A root context driven by an external token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                deadline: None,
                expired: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// A context canceled along with this one, or independently via
    /// [`StepContext::cancel`].
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                deadline: self.inner.deadline,
                expired: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    /// A child context that expires after `duration`.
    ///
    /// Must be called from within a tokio runtime. Cancel the returned
    /// context once it is no longer needed to release its timer.
    pub fn with_timeout(&self, duration: Duration) -> Self {
        let deadline = Instant::now() + duration;
        let ctx = Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                deadline: Some(match self.inner.deadline {
                    Some(parent) if parent < deadline => parent,
                    _ => deadline,
                }),
                expired: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        };

        let timer = ctx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    timer.inner.expired.store(true, Ordering::SeqCst);
                    timer.inner.token.cancel();
                }
                _ = timer.inner.token.cancelled() => {}
            }
        });

        ctx
    }

    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once this context is canceled or its deadline passes.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Why this context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<ExecError> {
        if !self.inner.token.is_cancelled() {
            return None;
        }
        if self.inner.expired.load(Ordering::SeqCst) {
            return Some(ExecError::DeadlineExceeded);
        }
        if let Some(parent) = &self.inner.parent {
            if let Some(err) = parent.err() {
                return Some(err);
            }
        }
        Some(ExecError::Canceled)
    }
}

impl Default for StepContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_is_live() {
        let ctx = StepContext::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_children_only() {
        let parent = StepContext::background();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(parent.err().is_none());
        assert!(matches!(child.err(), Some(ExecError::Canceled)));
        assert!(matches!(grandchild.err(), Some(ExecError::Canceled)));

        let other = parent.child();
        parent.cancel();
        other.cancelled().await;
        assert!(matches!(other.err(), Some(ExecError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_deadline_exceeded() {
        let parent = StepContext::background();
        let ctx = parent.with_timeout(Duration::from_millis(10));
        let child = ctx.child();

        child.cancelled().await;
        assert!(matches!(ctx.err(), Some(ExecError::DeadlineExceeded)));
        assert!(matches!(child.err(), Some(ExecError::DeadlineExceeded)));
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_beats_timeout() {
        let parent = StepContext::background();
        let ctx = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        ctx.cancelled().await;
        assert!(matches!(ctx.err(), Some(ExecError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_timeout_keeps_earliest_deadline() {
        let outer = StepContext::background().with_timeout(Duration::from_millis(5));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());

        inner.cancelled().await;
        assert!(matches!(inner.err(), Some(ExecError::DeadlineExceeded)));
    }
}
