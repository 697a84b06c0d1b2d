use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::Result;
use crate::ratelimit::{ConfigError, LimitConfig, RateLimitError, WaitContext};

/// Tolerance for floating point drift when comparing token balances
const TOKEN_EPSILON: f64 = 1e-9;

/// Mutable part of a [`TokenBucket`]
#[derive(Debug)]
struct BucketState {
    /// Currently available permits; negative while the bucket is in debt
    tokens: f64,
    /// When `tokens` was last brought up to date
    last_refill: Instant,
}

impl BucketState {
    /// Credit the permits accumulated since the last refill, capped at `capacity`
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + rate * elapsed.as_secs_f64()).min(capacity);
        self.last_refill = now;
    }
}

/// Continuously refilled token bucket for a single domain.
///
/// The bucket starts full. There is no background timer: every operation
/// first credits the permits earned since the previous operation, so the
/// balance is always consistent with the elapsed (monotonic) time.
///
/// Permits can be taken in three ways:
/// - [`TokenBucket::try_acquire`] never waits and never goes into debt
/// - [`TokenBucket::reserve`] always succeeds, possibly driving the balance
///   negative, and reports how long the caller has to wait
/// - [`TokenBucket::acquire`] reserves and then sleeps, honoring a
///   [`WaitContext`]
#[derive(Debug)]
pub struct TokenBucket {
    config: LimitConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket for the given configuration
    #[must_use]
    pub fn new(config: LimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst_capacity()),
                last_refill: Instant::now(),
            }),
        }
    }

    /// The configuration this bucket was created with
    #[must_use]
    pub const fn config(&self) -> LimitConfig {
        self.config
    }

    /// Permits available right now. Negative while reservations are pending.
    #[must_use]
    pub fn available_tokens(&self) -> f64 {
        self.refilled_state(Instant::now()).tokens
    }

    /// Take `permits` if they are available right now.
    ///
    /// Returns `false` without touching the balance otherwise; a partial
    /// amount is never consumed.
    #[must_use]
    pub fn try_acquire(&self, permits: u32) -> bool {
        let mut state = self.refilled_state(Instant::now());
        let permits = f64::from(permits);
        if state.tokens + TOKEN_EPSILON >= permits {
            state.tokens -= permits;
            true
        } else {
            false
        }
    }

    /// Take `permits` immediately, going into debt if necessary.
    ///
    /// The returned [`Reservation`] tells the caller how long to wait before
    /// the debt is repaid by future refills. Call [`Reservation::cancel`] to
    /// give the permits back if the request is abandoned.
    pub fn reserve(&self, permits: u32) -> Reservation<'_> {
        self.reserve_at(permits, Instant::now())
    }

    fn reserve_at(&self, permits: u32, now: Instant) -> Reservation<'_> {
        let mut state = self.refilled_state(now);
        state.tokens -= f64::from(permits);

        // Very low rates can push the repayment beyond what `Duration` or
        // `Instant` can represent; such a reservation is never ready.
        let delay = if state.tokens < -TOKEN_EPSILON {
            Duration::try_from_secs_f64(-state.tokens / self.config.rate_per_second())
                .unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };

        Reservation {
            bucket: self,
            permits,
            delay,
            ready_at: now.checked_add(delay),
        }
    }

    /// Wait until `permits` are available, or until the context gives up.
    ///
    /// On success returns the delay the bucket imposed (zero if the permits
    /// were available immediately).
    ///
    /// A deadline that cannot be met is detected up front: the reservation is
    /// cancelled and the call returns without sleeping. Cancellation through
    /// the context's token interrupts the sleep. In both cases the permits are
    /// returned to the bucket, as they are when the returned future is
    /// dropped before the wait completes.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::InvalidConfig`] if `permits` is zero or larger than
    ///   the burst capacity
    /// - [`RateLimitError::DeadlineExceeded`] if the deadline has passed or
    ///   would pass before the permits are available
    /// - [`RateLimitError::Cancelled`] if the context was cancelled
    pub async fn acquire(&self, permits: u32, ctx: &WaitContext) -> Result<Duration> {
        self.check_permits(permits)?;
        if ctx.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let now = Instant::now();
        if ctx.deadline().is_some_and(|deadline| deadline <= now) {
            return Err(RateLimitError::DeadlineExceeded {
                required: Duration::ZERO,
            });
        }

        let reservation = self.reserve_at(permits, now);
        let delay = reservation.delay();
        if delay.is_zero() {
            return Ok(Duration::ZERO);
        }

        let ready_at = reservation.ready_at();
        if let Some(deadline) = ctx.deadline()
            && ready_at.is_none_or(|ready_at| ready_at > deadline)
        {
            reservation.cancel();
            return Err(RateLimitError::DeadlineExceeded { required: delay });
        }

        // From here on the permits go back to the bucket unless the sleep
        // completes, including when this future is dropped.
        let pending = PendingReservation(Some(reservation));
        let Some(ready_at) = ready_at else {
            ctx.cancelled().await;
            return Err(RateLimitError::Cancelled);
        };

        tokio::select! {
            () = tokio::time::sleep_until(ready_at) => {
                pending.honor();
                Ok(delay)
            }
            () = ctx.cancelled() => Err(RateLimitError::Cancelled),
        }
    }

    /// Reject permit counts that can never be satisfied
    fn check_permits(&self, permits: u32) -> std::result::Result<(), ConfigError> {
        if permits == 0 {
            return Err(ConfigError::InvalidPermitCount(permits));
        }
        let burst = self.config.burst_capacity();
        if permits > burst {
            return Err(ConfigError::ExceedsBurst {
                requested: permits,
                burst,
            });
        }
        Ok(())
    }

    /// Give back permits of an abandoned reservation
    fn restore(&self, permits: u32) {
        let mut state = self.refilled_state(Instant::now());
        state.tokens = (state.tokens + f64::from(permits)).min(self.capacity());
    }

    fn capacity(&self) -> f64 {
        f64::from(self.config.burst_capacity())
    }

    /// Lock the state and bring it up to date with `now`
    fn refilled_state(&self, now: Instant) -> MutexGuard<'_, BucketState> {
        // The state is two plain numbers and stays consistent even if a
        // holder panicked, so poisoning is ignored.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refill(now, self.config.rate_per_second(), self.capacity());
        state
    }
}

/// Permits taken from a [`TokenBucket`] ahead of time.
///
/// Dropping a reservation keeps the permits consumed. Use
/// [`Reservation::cancel`] to return them.
#[derive(Debug)]
#[must_use = "dropping a reservation keeps its permits consumed; call `cancel` to return them"]
pub struct Reservation<'a> {
    bucket: &'a TokenBucket,
    permits: u32,
    delay: Duration,
    ready_at: Option<Instant>,
}

impl Reservation<'_> {
    /// How long the caller has to wait, measured from the reservation
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// The point in time at which the reserved permits are paid for.
    ///
    /// `None` if that point lies too far in the future to be represented.
    #[must_use]
    pub const fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    /// Number of reserved permits
    #[must_use]
    pub const fn permits(&self) -> u32 {
        self.permits
    }

    /// Return the reserved permits to the bucket
    pub fn cancel(self) {
        self.bucket.restore(self.permits);
    }
}

/// Reservation held by [`TokenBucket::acquire`] while it sleeps.
///
/// Cancels the reservation on drop unless it was honored.
#[derive(Debug)]
struct PendingReservation<'a>(Option<Reservation<'a>>);

impl PendingReservation<'_> {
    /// Keep the permits consumed
    fn honor(mut self) {
        self.0 = None;
    }
}

impl Drop for PendingReservation<'_> {
    fn drop(&mut self) {
        if let Some(reservation) = self.0.take() {
            reservation.cancel();
        }
    }
}
