//! Time sources
//!
//! [`Clock`] is the wall clock the bridge stamps records with. It can fail:
//! a relay that boots without network time or a backed-up RTC has no idea
//! what time it is. [`Uptime`] is the monotonic tick the uplink uses for
//! connectivity bookkeeping and for `received_at`.

#[cfg(any(test, feature = "test-util"))]
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::Instant;

/// 2020-01-01T00:00:00Z. Anything earlier means the clock was never set.
pub const MIN_SYNCED_EPOCH_SECS: u64 = 1_577_836_800;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock is not synchronized")]
    Unsynchronized,

    #[error("clock reads {0}s, before the minimum valid epoch")]
    BeforeEpoch(u64),
}

/// Source of wall-clock seconds since Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<u64, ClockError>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<u64, ClockError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::Unsynchronized)?
            .as_secs();

        if secs < MIN_SYNCED_EPOCH_SECS {
            return Err(ClockError::BeforeEpoch(secs));
        }
        Ok(secs)
    }
}

/// A clock that reads whatever it was last set to
///
/// Clones share state, so a test can keep a handle and move time or drop
/// synchronization while the clock is owned by a relay.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
    synced: Arc<AtomicBool>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(secs)),
            synced: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clock that has never been synchronized
    pub fn unsynchronized() -> Self {
        let clock = Self::new(0);
        clock.set_synchronized(false);
        clock
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set_synchronized(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> Result<u64, ClockError> {
        if !self.synced.load(Ordering::SeqCst) {
            return Err(ClockError::Unsynchronized);
        }
        Ok(self.secs.load(Ordering::SeqCst))
    }
}

/// Monotonic milliseconds since the process (or test) started
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    start: Instant,
}

impl Uptime {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::start()
    }
}
