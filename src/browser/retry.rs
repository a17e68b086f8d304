use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::browser::session::{BrowserSession, SessionManager};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

#[derive(Debug)]
enum RetryState {
    Idle,
    Running { attempt: u32 },
    Backoff { attempt: u32, last_error: AppError },
    Exhausted { attempts: u32, last_error: AppError },
}

/// Runs a browser operation with a fresh session after every failure.
pub struct RetryExecutor {
    sessions: Arc<SessionManager>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(sessions: Arc<SessionManager>, policy: RetryPolicy) -> Arc<Self> {
        Arc::new(Self { sessions, policy })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is used up (→ `ScrapingFailed`). The session is created
    /// lazily, replaced after each failure and always closed at the end.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<BrowserSession>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut session: Option<Arc<BrowserSession>> = None;
        let mut state = RetryState::Idle;

        let outcome = loop {
            state = match state {
                RetryState::Idle => RetryState::Running { attempt: 1 },

                RetryState::Running { attempt } => {
                    let result = match self.session(&mut session).await {
                        Ok(s) => op(s).await,
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(value) => {
                            debug!(label, attempt, "Operation succeeded");
                            break Ok(value);
                        }
                        Err(e) if !e.is_retryable() => break Err(e),
                        Err(e) if attempt >= max_attempts => RetryState::Exhausted {
                            attempts: attempt,
                            last_error: e,
                        },
                        Err(e) => RetryState::Backoff {
                            attempt,
                            last_error: e,
                        },
                    }
                }

                RetryState::Backoff { attempt, last_error } => {
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        error = %last_error,
                        "Attempt failed, resetting session"
                    );
                    if let Some(s) = session.take() {
                        s.close().await;
                    }
                    tokio::time::sleep(self.policy.delay).await;
                    RetryState::Running {
                        attempt: attempt + 1,
                    }
                }

                RetryState::Exhausted { attempts, last_error } => {
                    error!(label, attempts, error = %last_error, "Retries exhausted");
                    break Err(AppError::ScrapingFailed {
                        label: label.to_string(),
                        attempts,
                        source: Box::new(last_error),
                    });
                }
            };
        };

        if let Some(s) = session.take() {
            s.close().await;
        }
        outcome
    }

    async fn session(&self, slot: &mut Option<Arc<BrowserSession>>) -> Result<Arc<BrowserSession>> {
        if let Some(s) = slot {
            return Ok(Arc::clone(s));
        }
        let s = self.sessions.create().await?;
        *slot = Some(Arc::clone(&s));
        Ok(s)
    }
}
