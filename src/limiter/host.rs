use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// `max_requests` admissions per rolling `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
        }
    }
}

// ---------------------------------------------------------------------------
// HostRateState
// ---------------------------------------------------------------------------

/// Admission log for one host. The oldest entry defines when the window resets.
#[derive(Debug, Default)]
struct HostRateState {
    admitted: VecDeque<Instant>,
}

impl HostRateState {
    /// Drop admissions that have aged out of the window ending at `now`.
    fn expire(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now >= oldest + window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn count(&self) -> usize {
        self.admitted.len()
    }

    fn window_reset(&self, window: Duration) -> Option<Instant> {
        self.admitted.front().map(|&oldest| oldest + window)
    }
}

// ---------------------------------------------------------------------------
// HostRateLimiter
// ---------------------------------------------------------------------------

/// Per-host request ceiling shared by every network-issuing component.
///
/// Callers over the ceiling are suspended until the window reopens and then
/// re-evaluated; nothing is dropped and there is no queue priority.
pub struct HostRateLimiter {
    limit: RateLimit,
    /// host → admission log. Each host's read-then-write happens under its
    /// DashMap entry lock and never spans an await.
    hosts: DashMap<String, HostRateState>,
}

impl HostRateLimiter {
    pub fn new(limit: RateLimit) -> Arc<Self> {
        Arc::new(Self {
            limit,
            hosts: DashMap::new(),
        })
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Suspend until one request to `host` may be issued, then record it.
    pub async fn acquire(&self, host: &str) {
        loop {
            match self.try_admit(host, Instant::now()) {
                Ok(()) => return,
                Err(reset_at) => {
                    let wait = reset_at.saturating_duration_since(Instant::now());
                    debug!(host, wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Rate-limit by the host component of `url`. Unparseable URLs share one bucket.
    pub async fn acquire_url(&self, url: &str) {
        let host = host_of(url);
        self.acquire(&host).await;
    }

    /// Admit at `now` or return the instant at which the window reopens.
    fn try_admit(&self, host: &str, now: Instant) -> Result<(), Instant> {
        let mut state = self.hosts.entry(host.to_string()).or_default();
        state.expire(now, self.limit.window);
        if state.count() < self.limit.max_requests as usize {
            state.admitted.push_back(now);
            Ok(())
        } else {
            // Non-empty here: count >= max_requests >= 1.
            Err(state
                .window_reset(self.limit.window)
                .unwrap_or(now + self.limit.window))
        }
    }

    /// Admissions currently inside the window for `host`.
    pub fn in_window(&self, host: &str) -> usize {
        match self.hosts.get_mut(host) {
            Some(mut state) => {
                state.expire(Instant::now(), self.limit.window);
                state.count()
            }
            None => 0,
        }
    }
}

pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
