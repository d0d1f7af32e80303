use janus_dns_domain::ForwardError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default overall deadline when the caller supplies none.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline and cancellation carried by one in-flight query.
///
/// Every client clips its per-protocol timeout against `deadline` and
/// observes `cancel` at each suspension point; the race coordinator hands
/// siblings a child context so cancelling losers never touches the caller's
/// token.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl QueryContext {
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Same deadline, child token: cancelling the child leaves the parent
    /// untouched, cancelling the parent propagates down.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    /// The earlier of `now + timeout` and the carried deadline.
    pub fn clip(&self, timeout: Duration) -> Instant {
        self.deadline.min(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_QUERY_TIMEOUT)
    }
}

/// Runs `fut` until `io_deadline`, aborting early when `ctx` is cancelled.
/// This is the single suspension wrapper every wire operation goes through.
pub async fn guard<T, F>(
    ctx: &QueryContext,
    io_deadline: Instant,
    fut: F,
) -> Result<T, ForwardError>
where
    F: Future<Output = Result<T, ForwardError>>,
{
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(ForwardError::Cancelled),
        res = tokio::time::timeout_at(io_deadline, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(ForwardError::DeadlineExceeded),
        },
    }
}
