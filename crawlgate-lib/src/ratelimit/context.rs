use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bounds a blocking wait for permits.
///
/// A context can carry a deadline, a cancellation token, both, or neither.
/// The default context waits as long as the bucket needs.
///
/// ```
/// use std::time::Duration;
/// use crawlgate_lib::WaitContext;
/// use tokio_util::sync::CancellationToken;
///
/// let shutdown = CancellationToken::new();
/// let ctx = WaitContext::default()
///     .with_timeout(Duration::from_secs(5))
///     .with_cancellation(shutdown.child_token());
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

impl WaitContext {
    /// A context that never expires and cannot be cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up if the permit is not available by `deadline`
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up if the permit is not available within `timeout` from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Abort the wait as soon as `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The point in time after which the wait is pointless
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the cancellation token has already fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Resolves once the context is cancelled; never resolves without a token
    pub(crate) async fn cancelled(&self) {
        match &self.cancellation {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}
