use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in seconds since the UNIX epoch.
///
/// Button timestamps and image cache bookkeeping are expressed in these
/// seconds so that tests and simulators can drive time explicitly.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: f64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += secs;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|g| *g).unwrap_or(0.0)
    }
}
