//! Sliding-window rate limiting per named dependency.
//!
//! Each dependency name (`"DataExtractor"`, `"linkedin"`, ...) gets its own
//! window of request timestamps. Admission asks whether fewer than
//! `max_requests` requests were recorded within the last `time_window`.
//!
//! Checking and recording are separate steps so that a call which ends up
//! not being issued is never charged. For concurrent callers,
//! [`RateLimiter::try_reserve`] performs the check and holds a slot in one
//! atomic step; the slot becomes a recorded request on
//! [`RateReservation::commit`] or is released when the reservation is dropped.
//!
//! ```text
//! try_reserve("linkedin") --admitted--> RateReservation --commit()--> timestamp recorded
//!                                             |
//!                                             +--drop--> slot released, nothing charged
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Request history for one dependency name.
#[derive(Debug, Default)]
struct RateWindow {
    /// Non-decreasing request times, oldest first.
    timestamps: VecDeque<Instant>,
    /// Admitted reservations not yet committed or released.
    reserved: usize,
}

impl RateWindow {
    /// Drop entries strictly older than `window`. An entry aged exactly
    /// `window` stays.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn occupied(&self) -> usize {
        self.timestamps.len() + self.reserved
    }

    fn record(&mut self, at: Instant) {
        // Keep the sequence monotonic even if callers hand us an older instant.
        let at = match self.timestamps.back() {
            Some(&last) if last > at => last,
            _ => at,
        };
        self.timestamps.push_back(at);
    }
}

#[derive(Debug)]
struct Shared {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl Shared {
    /// Acquires the windows lock, recovering from poison if necessary.
    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, RateWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned rate limiter mutex");
            poisoned.into_inner()
        })
    }
}

/// Process-wide rate limiter. Cloning shares the same windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                windows: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.shared.config
    }

    /// Whether a request to `dependency` would be admitted right now.
    ///
    /// Prunes the window but never records anything.
    pub fn can_request(&self, dependency: &str) -> bool {
        self.can_request_at(dependency, Instant::now())
    }

    fn can_request_at(&self, dependency: &str, now: Instant) -> bool {
        if dependency.is_empty() {
            return false;
        }
        let config = self.shared.config;
        let mut windows = self.shared.lock_windows();
        let window = windows.entry(dependency.to_string()).or_default();
        window.prune(now, config.time_window);
        window.occupied() < config.max_requests
    }

    /// Record a request to `dependency` issued now.
    pub fn record_request(&self, dependency: &str) {
        self.record_request_at(dependency, Instant::now());
    }

    fn record_request_at(&self, dependency: &str, at: Instant) {
        if dependency.is_empty() {
            return;
        }
        let mut windows = self.shared.lock_windows();
        windows.entry(dependency.to_string()).or_default().record(at);
    }

    /// Atomically admit one request to `dependency` and hold its slot.
    ///
    /// Returns `None` when the window is full.
    pub fn try_reserve(&self, dependency: &str) -> Option<RateReservation> {
        self.try_reserve_at(dependency, Instant::now())
    }

    fn try_reserve_at(&self, dependency: &str, now: Instant) -> Option<RateReservation> {
        if dependency.is_empty() {
            return None;
        }
        let config = self.shared.config;
        let mut windows = self.shared.lock_windows();
        let window = windows.entry(dependency.to_string()).or_default();
        window.prune(now, config.time_window);
        if window.occupied() >= config.max_requests {
            tracing::debug!(
                dependency = %dependency,
                recorded = window.timestamps.len(),
                reserved = window.reserved,
                "Rate limit reached"
            );
            return None;
        }
        window.reserved += 1;
        Some(RateReservation {
            shared: Arc::clone(&self.shared),
            dependency: dependency.to_string(),
            settled: false,
        })
    }

    /// Recorded requests for `dependency` still inside the window.
    pub fn usage(&self, dependency: &str) -> usize {
        let config = self.shared.config;
        let mut windows = self.shared.lock_windows();
        match windows.get_mut(dependency) {
            Some(window) => {
                window.prune(Instant::now(), config.time_window);
                window.timestamps.len()
            }
            None => 0,
        }
    }
}

/// An admitted, not yet issued request.
#[must_use = "dropping a reservation releases it without recording a request"]
#[derive(Debug)]
pub struct RateReservation {
    shared: Arc<Shared>,
    dependency: String,
    settled: bool,
}

impl RateReservation {
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// The request is being issued: turn the slot into a recorded timestamp.
    pub fn commit(mut self) {
        self.settle(Some(Instant::now()));
    }

    fn settle(&mut self, recorded_at: Option<Instant>) {
        if self.settled {
            return;
        }
        self.settled = true;
        let mut windows = self.shared.lock_windows();
        if let Some(window) = windows.get_mut(&self.dependency) {
            window.reserved = window.reserved.saturating_sub(1);
            if let Some(at) = recorded_at {
                window.record(at);
            }
        }
    }
}

impl Drop for RateReservation {
    fn drop(&mut self) {
        self.settle(None);
    }
}
