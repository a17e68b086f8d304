//! Shared health counters for the /health endpoint.
//! Updated by the aggregator and the prediction route.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::db::now_secs;

#[derive(Default)]
pub struct HealthState {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Records built from scratch (cache misses that completed).
    pub builds: AtomicU64,
    pub build_failures: AtomicU64,
    pub predictions_served: AtomicU64,
    started_at: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub builds: u64,
    pub build_failures: u64,
    pub predictions_served: u64,
}

impl HealthState {
    pub fn new() -> Self {
        let state = Self::default();
        state.started_at.store(now_secs() as u64, Ordering::Relaxed);
        state
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build(&self, ok: bool) {
        if ok {
            self.builds.fetch_add(1, Ordering::Relaxed);
        } else {
            self.build_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_predictions_served(&self, n: u64) {
        self.predictions_served.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let started = self.started_at.load(Ordering::Relaxed);
        HealthSnapshot {
            status: "ok",
            uptime_secs: (now_secs() as u64).saturating_sub(started),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            build_failures: self.build_failures.load(Ordering::Relaxed),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_snapshot() {
        let health = HealthState::new();
        health.record_hit();
        health.record_miss();
        health.record_miss();
        health.record_build(true);
        health.record_build(false);
        health.add_predictions_served(3);

        let snap = health.snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 2);
        assert_eq!(snap.builds, 1);
        assert_eq!(snap.build_failures, 1);
        assert_eq!(snap.predictions_served, 3);
    }
}
