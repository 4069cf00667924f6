//! Per-call deadlines and cancellation.
//!
//! Every store round trip the core issues runs inside [`CallContext::run`]. A call
//! that outlives its deadline fails with [`BrowseError::Timeout`]; a call whose
//! [`CancelHandle`] fires fails with [`BrowseError::Cancelled`]. Either way the
//! outstanding store future is dropped, which aborts the round trip.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::error::{BrowseError, BrowseResult};

/// The caller's side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Creates a handle together with its first token.
    pub fn new() -> (CancelHandle, CancelToken) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle {
                sender: Arc::new(sender),
            },
            CancelToken { receiver },
        )
    }

    /// Signals cancellation to every token. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Creates another token observing this handle.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }
}

/// The operation's side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is signalled. Never resolves if every handle was
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Deadline and cancellation signal for one facade call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Deadline for each store round trip. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Cancellation signal. `None` cannot be cancelled.
    pub cancel: Option<CancelToken>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns a copy that uses `fallback` when no deadline was set.
    pub fn or_timeout(&self, fallback: Option<Duration>) -> CallContext {
        CallContext {
            timeout: self.timeout.or(fallback),
            cancel: self.cancel.clone(),
        }
    }

    /// Drives `operation` under this context's deadline and cancellation signal.
    ///
    /// # Errors
    ///
    /// Returns [`BrowseError::Cancelled`] when cancellation was signalled before or
    /// during the operation, [`BrowseError::Timeout`] when the deadline elapsed, and
    /// the operation's own error otherwise.
    pub async fn run<T, F>(&self, operation: F) -> BrowseResult<T>
    where
        F: Future<Output = BrowseResult<T>>,
    {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(BrowseError::Cancelled);
        }

        let guarded = async {
            match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(BrowseError::Cancelled),
                    result = operation => result,
                },
                None => operation.await,
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| BrowseError::Timeout(limit))?,
            None => guarded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn passes_results_through() {
        let value = CallContext::new().run(async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);

        let err = CallContext::new()
            .run(async { Err::<(), _>(BrowseError::Backend("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, BrowseError::Backend(_)));
    }

    #[tokio::test]
    async fn deadline_elapses() {
        let context = CallContext::new().with_timeout(Duration::from_millis(10));
        let err = context
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BrowseError::Timeout(limit) if limit == Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn cancellation_aborts_outstanding_work() {
        let (handle, token) = CancelHandle::new();
        let context = CallContext::new().with_cancel(token);

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = context
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BrowseError::Cancelled));

        // Already cancelled: fails before the operation is polled.
        let err = context.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, BrowseError::Cancelled));
        assert!(handle.token().is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, token) = CancelHandle::new();
        drop(handle);

        let context = CallContext::new().with_cancel(token);
        let value = context
            .run(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("done")
            })
            .await
            .unwrap();
        assert_eq!(value, "done");
    }

    #[test]
    fn fallback_timeout_only_fills_gaps() {
        let explicit = CallContext::new().with_timeout(Duration::from_millis(1));
        assert_eq!(
            explicit.or_timeout(Some(Duration::from_secs(9))).timeout,
            Some(Duration::from_millis(1))
        );
        assert_eq!(
            CallContext::new().or_timeout(Some(Duration::from_secs(9))).timeout,
            Some(Duration::from_secs(9))
        );
    }
}
