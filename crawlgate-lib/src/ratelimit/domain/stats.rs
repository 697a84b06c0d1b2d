use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;
use tokio::time::Instant;

/// Fields that are updated together and therefore share a lock
#[derive(Debug, Default)]
struct Timing {
    total_wait_time: Duration,
    last_request: Option<Instant>,
}

/// Live request statistics for a [`crate::ratelimit::Domain`]
///
/// The counters are independent atomics, so recording a request never
/// contends with recording a delay. Only the accumulated wait time and the
/// timestamp of the last request live behind a mutex.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    total_requests: AtomicU64,
    delayed_requests: AtomicU64,
    timing: Mutex<Timing>,
}

impl StatsAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a granted request
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.timing().last_request = Some(Instant::now());
    }

    /// Count a request that had to wait for `wait` before it was granted
    pub fn record_delay(&self, wait: Duration) {
        self.delayed_requests.fetch_add(1, Ordering::SeqCst);
        self.timing().total_wait_time += wait;
    }

    /// Take a consistent copy of the current statistics
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        // A delayed request is always counted as a request first, so loading
        // in this order keeps `delayed_requests <= total_requests`.
        let delayed_requests = self.delayed_requests.load(Ordering::SeqCst);
        let total_requests = self.total_requests.load(Ordering::SeqCst);
        let (total_wait_time, last_request) = {
            let timing = self.timing();
            (timing.total_wait_time, timing.last_request)
        };

        StatsSnapshot {
            total_requests,
            delayed_requests,
            total_wait_time,
            last_request,
        }
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::SeqCst);
        self.delayed_requests.store(0, Ordering::SeqCst);
        *self.timing() = Timing::default();
    }

    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time copy of a domain's statistics
///
/// Snapshots are plain values: recording more requests on the live
/// accumulator never changes a snapshot that was already handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Number of granted requests
    pub total_requests: u64,
    /// Number of granted requests that had to wait
    pub delayed_requests: u64,
    /// Sum of all waits of delayed requests
    pub total_wait_time: Duration,
    /// When the last request was granted
    pub last_request: Option<Instant>,
}

impl StatsSnapshot {
    /// Share of requests that had to wait (0.0 to 1.0)
    #[must_use]
    pub fn delay_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.delayed_requests as f64 / self.total_requests as f64;
        rate
    }

    /// Average wait of the requests that had to wait
    #[must_use]
    pub fn avg_wait_time(&self) -> Duration {
        if self.delayed_requests == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_wait_time.as_nanos() / u128::from(self.delayed_requests);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} requests ({} delayed, {:.1}%), avg wait: {}ms",
            self.total_requests,
            self.delayed_requests,
            self.delay_rate() * 100.0,
            self.avg_wait_time().as_millis()
        )
    }
}

impl Serialize for StatsSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[allow(clippy::cast_possible_truncation)]
        let millis = |d: Duration| d.as_millis() as u64;
        let idle_ms = self.last_request.map(|instant| millis(instant.elapsed()));

        let mut s = serializer.serialize_struct("StatsSnapshot", 6)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("delayed_requests", &self.delayed_requests)?;
        s.serialize_field("delay_rate", &self.delay_rate())?;
        s.serialize_field("total_wait_time_ms", &millis(self.total_wait_time))?;
        s.serialize_field("avg_wait_time_ms", &millis(self.avg_wait_time()))?;
        s.serialize_field("ms_since_last_request", &idle_ms)?;
        s.end()
    }
}

/// A [`HashMap`] mapping domains to their [`StatsSnapshot`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsMap(HashMap<String, StatsSnapshot>);

impl StatsMap {
    /// Sort domain statistics by request count (descending order),
    /// breaking ties by domain name
    #[must_use]
    pub fn sorted(&self) -> Vec<(String, StatsSnapshot)> {
        let mut sorted: Vec<_> = self
            .0
            .iter()
            .map(|(domain, stats)| (domain.clone(), *stats))
            .collect();
        sorted.sort_by(|(a_domain, a), (b_domain, b)| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a_domain.cmp(b_domain))
        });
        sorted
    }

    /// Statistics for a single domain
    #[must_use]
    pub fn get(&self, domain: &str) -> Option<&StatsSnapshot> {
        self.0.get(domain)
    }

    /// Number of domains
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no domain has been used yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the map
    #[must_use]
    pub fn into_inner(self) -> HashMap<String, StatsSnapshot> {
        self.0
    }
}

impl From<HashMap<String, StatsSnapshot>> for StatsMap {
    fn from(value: HashMap<String, StatsSnapshot>) -> Self {
        Self(value)
    }
}

impl FromIterator<(String, StatsSnapshot)> for StatsMap {
    fn from_iter<I: IntoIterator<Item = (String, StatsSnapshot)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
