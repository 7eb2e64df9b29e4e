//! Request-scoped execution context passed to every repository operation.
//!
//! The context carries the caller's trace identifier, a cancellation token
//! owned by the caller, and an optional deadline. Store calls made on behalf
//! of a request go through [`RequestContext::run`] so that cancellation and
//! deadlines surface as [`StoreError`] values instead of hanging the caller.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::TraceId;
use super::ports::StoreError;

/// Execution context for one caller request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: TraceId,
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

impl RequestContext {
    /// Context with a fresh trace identifier, no deadline, and a token
    /// nobody else holds.
    pub fn background() -> Self {
        Self::new(TraceId::generate(), CancellationToken::new())
    }

    /// Context bound to an existing trace identifier and cancellation token.
    pub fn new(trace_id: TraceId, cancellation: CancellationToken) -> Self {
        Self {
            trace_id,
            cancellation,
            timeout: None,
        }
    }

    /// Apply a deadline to every store call made with this context.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Replace the trace identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Trace identifier for log correlation.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Token the caller cancels to abandon the request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Per-call deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// True once the caller has cancelled the request.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Drive one store call under this context.
    ///
    /// Fails fast with [`StoreError::Cancelled`] when the token is already
    /// cancelled, drops the call if the token fires while it is pending, and
    /// reports [`StoreError::Timeout`] once the deadline passes. The trace
    /// identifier is in task-local scope for the duration of the call.
    ///
    /// # Examples
    /// ```
    /// use user_registry::domain::RequestContext;
    /// use user_registry::domain::ports::StoreError;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let ctx = RequestContext::background();
    /// ctx.cancellation().cancel();
    /// let result = ctx.run("ping", async { Ok::<_, StoreError>(()) }).await;
    /// assert_eq!(result, Err(StoreError::cancelled("ping")));
    /// # });
    /// ```
    pub async fn run<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.is_cancelled() {
            return Err(StoreError::cancelled(operation));
        }

        let scoped = TraceId::scope(self.trace_id, call);
        let guarded = async {
            tokio::select! {
                biased;
                () = self.cancellation.cancelled() => Err(StoreError::cancelled(operation)),
                result = scoped => result,
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| StoreError::timeout(operation))?,
            None => guarded.await,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for request-scoped execution.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn run_returns_call_result() {
        let ctx = RequestContext::background();
        let result = ctx.run("read", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[rstest]
    #[tokio::test]
    async fn run_scopes_trace_id() {
        let trace_id = TraceId::generate();
        let ctx = RequestContext::background().with_trace_id(trace_id);
        let observed = ctx
            .run("read", async { Ok::<_, StoreError>(TraceId::current()) })
            .await;
        assert_eq!(observed, Ok(Some(trace_id)));
    }

    #[rstest]
    #[tokio::test]
    async fn pre_cancelled_context_never_polls_call() {
        let ctx = RequestContext::background();
        ctx.cancellation().cancel();
        let polled = AtomicBool::new(false);
        let result = ctx
            .run("commit", async {
                polled.store(true, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
            .await;
        assert_eq!(result, Err(StoreError::cancelled("commit")));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[rstest]
    #[tokio::test]
    async fn cancellation_interrupts_pending_call() {
        let token = CancellationToken::new();
        let ctx = RequestContext::background().with_cancellation(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = ctx
            .run("commit", std::future::pending::<Result<(), StoreError>>())
            .await;

        canceller.await.expect("canceller task");
        assert_eq!(result, Err(StoreError::cancelled("commit")));
    }

    #[rstest]
    #[tokio::test]
    async fn deadline_reports_timeout() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(10));
        let result = ctx
            .run("commit", std::future::pending::<Result<(), StoreError>>())
            .await;
        assert_eq!(result, Err(StoreError::timeout("commit")));
    }
}
