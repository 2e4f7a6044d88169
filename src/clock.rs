//! Time sources

use std::{
    sync::{
        Arc, LazyLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Source of the current time.
///
/// Token claims are checked against [unix_now](Clock::unix_now). Cache bookkeeping
/// uses [monotonic_now](Clock::monotonic_now), which never moves backwards when the
/// wall clock is stepped.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch
    fn unix_now(&self) -> u64;

    /// Time elapsed since an arbitrary fixed point
    fn monotonic_now(&self) -> Duration;
}

static MONOTONIC_ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

/// The system clocks: wall time for claims, [Instant] for intervals
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }

    fn monotonic_now(&self) -> Duration {
        MONOTONIC_ORIGIN.elapsed()
    }
}

/// A clock that only moves when told to. Clones share the same time, so a test can
/// hand one clone to the key cache and keep another to advance it.
///
/// [advance](ManualClock::advance) moves both readings. [set](ManualClock::set) only
/// steps the wall clock, like an NTP correction would.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    unix: Arc<AtomicU64>,
    monotonic: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(unix_now: u64) -> Self {
        Self {
            unix: Arc::new(AtomicU64::new(unix_now)),
            monotonic: Arc::default(),
        }
    }

    pub fn set(&self, unix_now: u64) {
        self.unix.store(unix_now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.unix.fetch_add(by.as_secs(), Ordering::SeqCst);
        self.monotonic.fetch_add(by.as_secs(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn unix_now(&self) -> u64 {
        self.unix.load(Ordering::SeqCst)
    }

    fn monotonic_now(&self) -> Duration {
        Duration::from_secs(self.monotonic.load(Ordering::SeqCst))
    }
}
