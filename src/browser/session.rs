use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::proxy::{ProxyDescriptor, ProxyRotation};
use crate::browser::{
    scripts, BrowserDriver, BrowserHandle, ContextHandle, LaunchOptions, PageHandle, WaitPolicy,
};
use crate::error::{AppError, Result};
use crate::limiter::HostRateLimiter;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Markers of an interstitial challenge page, matched against lowercased HTML.
const CHALLENGE_MARKERS: &[&str] = &[
    "<title>just a moment",
    "<title>attention required",
    "cf-browser-verification",
    "challenges.cloudflare.com",
    "cf-chl-",
    "id=\"challenge-form\"",
    "g-recaptcha",
    "h-captcha",
    "px-captcha",
];

const CHALLENGE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Identity a session presents to the scraped site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFingerprint {
    pub user_agent: String,
    pub viewport: Viewport,
    pub accept_language: String,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub headless: bool,
    pub viewport: Viewport,
    pub accept_language: String,
    pub navigation_timeout: Duration,
    pub element_timeout: Duration,
    /// How long a challenge page may take to clear before the load counts as blocked.
    pub challenge_grace: Duration,
}

// ---------------------------------------------------------------------------
// User-agent rotation
// ---------------------------------------------------------------------------

/// Draws user agents from a shuffled deck; a reshuffle never repeats the
/// agent that was handed out last.
pub struct UserAgentRotation {
    pool: Vec<String>,
    deck: std::sync::Mutex<(Vec<String>, Option<String>)>,
}

impl UserAgentRotation {
    pub fn new(pool: Vec<String>) -> Self {
        Self {
            pool,
            deck: std::sync::Mutex::new((Vec::new(), None)),
        }
    }

    pub fn builtin() -> Self {
        Self::new(USER_AGENTS.iter().map(|s| s.to_string()).collect())
    }

    pub fn next(&self) -> String {
        let Some(first) = self.pool.first() else {
            return String::new();
        };
        let mut guard = match self.deck.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (deck, last) = &mut *guard;

        if deck.is_empty() {
            let mut fresh = self.pool.clone();
            fresh.shuffle(&mut rand::thread_rng());
            // The deck is drawn from the back.
            if fresh.len() > 1 && fresh.last() == last.as_ref() {
                let n = fresh.len();
                fresh.swap(0, n - 1);
            }
            *deck = fresh;
        }

        let ua = deck.pop().unwrap_or_else(|| first.clone());
        *last = Some(ua.clone());
        ua
    }
}

/// Whether the page looks like a bot-challenge interstitial.
pub fn looks_like_challenge(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    limiter: Arc<HostRateLimiter>,
    proxies: Option<Arc<ProxyRotation>>,
    user_agents: UserAgentRotation,
    settings: SessionSettings,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        limiter: Arc<HostRateLimiter>,
        proxies: Option<Arc<ProxyRotation>>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Self::with_user_agents(driver, limiter, proxies, settings, UserAgentRotation::builtin())
    }

    pub fn with_user_agents(
        driver: Arc<dyn BrowserDriver>,
        limiter: Arc<HostRateLimiter>,
        proxies: Option<Arc<ProxyRotation>>,
        settings: SessionSettings,
        user_agents: UserAgentRotation,
    ) -> Arc<Self> {
        Arc::new(Self {
            driver,
            limiter,
            proxies,
            user_agents,
            settings,
            next_id: AtomicU64::new(1),
        })
    }

    /// Launch a browser with a fresh fingerprint (and the next proxy, if
    /// rotation is on). Anything created before a failure is torn down.
    pub async fn create(&self) -> Result<Arc<BrowserSession>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let proxy = self.proxies.as_ref().and_then(|p| p.next());
        let fingerprint = SessionFingerprint {
            user_agent: self.user_agents.next(),
            viewport: self.settings.viewport,
            accept_language: self.settings.accept_language.clone(),
        };

        let session = Arc::new(BrowserSession {
            id,
            fingerprint,
            settings: self.settings.clone(),
            limiter: Arc::clone(&self.limiter),
            parts: Mutex::new(SessionParts::default()),
        });

        if let Err(e) = session.open(self.driver.as_ref(), proxy).await {
            warn!(session = id, "Session creation failed: {e}");
            session.close().await;
            return Err(e);
        }

        info!(
            session = id,
            user_agent = %session.fingerprint.user_agent,
            "Browser session created"
        );
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// BrowserSession
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionParts {
    browser: Option<Box<dyn BrowserHandle>>,
    context: Option<Box<dyn ContextHandle>>,
    page: Option<Arc<dyn PageHandle>>,
}

/// One browser, one isolated context, one page, one fingerprint.
/// Owned by a single logical operation.
pub struct BrowserSession {
    id: u64,
    fingerprint: SessionFingerprint,
    settings: SessionSettings,
    limiter: Arc<HostRateLimiter>,
    parts: Mutex<SessionParts>,
}

impl BrowserSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fingerprint(&self) -> &SessionFingerprint {
        &self.fingerprint
    }

    /// Creation order browser → context → page. Each part is stored as soon as
    /// it exists so `close` can unwind a partial session.
    async fn open(&self, driver: &dyn BrowserDriver, proxy: Option<ProxyDescriptor>) -> Result<()> {
        let options = LaunchOptions {
            headless: self.settings.headless,
            proxy,
            window_size: Some((self.settings.viewport.width, self.settings.viewport.height)),
        };

        let browser = driver.launch(&options).await?;
        let context = {
            let mut parts = self.parts.lock().await;
            let browser = parts.browser.insert(browser);
            browser.new_context(&self.fingerprint).await?
        };
        let page = {
            let mut parts = self.parts.lock().await;
            let context = parts.context.insert(context);
            context.new_page().await?
        };
        let page: Arc<dyn PageHandle> = Arc::from(page);
        self.parts.lock().await.page = Some(Arc::clone(&page));

        page.add_init_script(scripts::STEALTH).await
    }

    async fn page(&self) -> Result<Arc<dyn PageHandle>> {
        self.parts
            .lock()
            .await
            .page
            .clone()
            .ok_or_else(|| AppError::Browser(format!("session {} is closed", self.id)))
    }

    /// Navigate, rate-limited by host. Fails on a non-2xx/304 status or a
    /// challenge page that outlives the grace period.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.limiter.acquire_url(url).await;
        let page = self.page().await?;

        debug!(session = self.id, url, "Navigating");
        let response = page
            .goto(url, WaitPolicy::DomContentLoaded, self.settings.navigation_timeout)
            .await?;

        if self.wait_out_challenge(page.as_ref(), url).await? {
            // The challenge reloaded the document; the original status is stale.
            return Ok(());
        }

        match response.status {
            Some(status) if !(200..300).contains(&status) && status != 304 => {
                Err(AppError::PageLoadError {
                    url: url.to_string(),
                    reason: format!("HTTP {status}"),
                })
            }
            _ => Ok(()),
        }
    }

    /// Ok(false): no challenge. Ok(true): a challenge cleared within the grace period.
    async fn wait_out_challenge(&self, page: &dyn PageHandle, url: &str) -> Result<bool> {
        if !looks_like_challenge(&page.content().await?) {
            return Ok(false);
        }

        warn!(session = self.id, url, "Anti-bot challenge detected, waiting");
        let deadline = tokio::time::Instant::now() + self.settings.challenge_grace;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(CHALLENGE_POLL).await;
            if !looks_like_challenge(&page.content().await?) {
                info!(session = self.id, url, "Challenge cleared");
                return Ok(true);
            }
        }
        Err(AppError::AntiBotBlocked {
            url: url.to_string(),
        })
    }

    pub async fn html(&self) -> Result<String> {
        self.page().await?.content().await
    }

    pub async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        self.page().await?.evaluate(expression).await
    }

    pub async fn wait_for(&self, selector: &str) -> Result<()> {
        self.page()
            .await?
            .wait_for_selector(selector, self.settings.element_timeout)
            .await
    }

    pub async fn scroll_by_viewport(&self) -> Result<()> {
        self.evaluate(scripts::SCROLL_BY_VIEWPORT).await.map(|_| ())
    }

    pub async fn scroll_height(&self) -> Result<u64> {
        Ok(self.evaluate(scripts::SCROLL_HEIGHT).await?.as_u64().unwrap_or(0))
    }

    /// Tear down page → context → browser. Safe to call repeatedly and on a
    /// partially created session; individual failures are only logged.
    pub async fn close(&self) {
        let parts = std::mem::take(&mut *self.parts.lock().await);
        if parts.browser.is_none() {
            return;
        }

        if let Some(page) = parts.page {
            if let Err(e) = page.close().await {
                debug!(session = self.id, "Page close failed: {e}");
            }
        }
        if let Some(context) = parts.context {
            if let Err(e) = context.close().await {
                debug!(session = self.id, "Context close failed: {e}");
            }
        }
        if let Some(browser) = parts.browser {
            if let Err(e) = browser.close().await {
                warn!(session = self.id, "Browser close failed: {e}");
            }
        }
        info!(session = self.id, "Browser session closed");
    }
}
