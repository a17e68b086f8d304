//! Scripted in-process browser for tests.
//!
//! URLs map to one or more HTML stages. A "scroll" route advances one stage per
//! `scrollBy` on the page; a "reads" route advances one stage per content read.
//! Scroll height grows with the stage, so a single-stage route never grows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::session::{SessionFingerprint, SessionSettings, Viewport};
use crate::browser::{
    scripts, BrowserDriver, BrowserHandle, ContextHandle, LaunchOptions, NavigationResponse,
    PageHandle, WaitPolicy,
};
use crate::error::{AppError, Result};

pub fn test_session_settings() -> SessionSettings {
    SessionSettings {
        headless: true,
        viewport: Viewport {
            width: 1920,
            height: 1080,
        },
        accept_language: "en-US,en;q=0.9".to_string(),
        navigation_timeout: Duration::from_secs(30),
        element_timeout: Duration::from_secs(10),
        challenge_grace: Duration::from_secs(5),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Advance {
    OnScroll,
    OnRead,
}

#[derive(Clone)]
struct Route {
    stages: Vec<String>,
    advance: Advance,
    status: u16,
}

#[derive(Default)]
pub struct FakeSite {
    routes: Mutex<HashMap<String, Route>>,
    /// url → remaining navigation failures
    goto_failures: Mutex<HashMap<String, usize>>,
    launch_failures: AtomicUsize,
    new_page_failures: AtomicUsize,

    launches: AtomicUsize,
    launch_proxies: Mutex<Vec<String>>,
    init_scripts: AtomicUsize,
    navigations: Mutex<Vec<String>>,
    scrolls: AtomicUsize,
    close_log: Mutex<Vec<&'static str>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn driver(self: &Arc<Self>) -> Arc<dyn BrowserDriver> {
        Arc::new(FakeDriver {
            site: Arc::clone(self),
        })
    }

    fn put(&self, url: &str, stages: Vec<String>, advance: Advance) {
        let mut routes = lock(&self.routes);
        let status = routes.get(url).map(|r| r.status).unwrap_or(200);
        routes.insert(url.to_string(), Route { stages, advance, status });
    }

    pub fn route(&self, url: &str, html: &str) {
        self.put(url, vec![html.to_string()], Advance::OnScroll);
    }

    /// Content grows one stage per viewport scroll.
    pub fn route_stages(&self, url: &str, stages: Vec<String>) {
        self.put(url, stages, Advance::OnScroll);
    }

    /// Content changes one stage per read (a challenge that clears itself).
    pub fn route_reads(&self, url: &str, stages: Vec<String>) {
        self.put(url, stages, Advance::OnRead);
    }

    pub fn status(&self, url: &str, status: u16) {
        let mut routes = lock(&self.routes);
        let route = routes.entry(url.to_string()).or_insert_with(|| Route {
            stages: vec![String::new()],
            advance: Advance::OnScroll,
            status: 200,
        });
        route.status = status;
    }

    /// The next `times` navigations to `url` fail with a browser error.
    pub fn fail_goto(&self, url: &str, times: usize) {
        lock(&self.goto_failures).insert(url.to_string(), times);
    }

    pub fn fail_launches(&self, times: usize) {
        self.launch_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_new_page(&self, times: usize) {
        self.new_page_failures.store(times, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn launch_proxies(&self) -> Vec<String> {
        lock(&self.launch_proxies).clone()
    }

    pub fn init_scripts(&self) -> usize {
        self.init_scripts.load(Ordering::SeqCst)
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        lock(&self.navigations).iter().filter(|u| *u == url).count()
    }

    pub fn close_log(&self) -> Vec<&'static str> {
        lock(&self.close_log).clone()
    }

    fn closed(&self, what: &str) -> usize {
        lock(&self.close_log).iter().filter(|w| **w == what).count()
    }

    pub fn browsers_closed(&self) -> usize {
        self.closed("browser")
    }

    pub fn contexts_closed(&self) -> usize {
        self.closed("context")
    }

    pub fn pages_closed(&self) -> usize {
        self.closed("page")
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

struct FakeDriver {
    site: Arc<FakeSite>,
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserHandle>> {
        self.site.launches.fetch_add(1, Ordering::SeqCst);
        if FakeSite::take_failure(&self.site.launch_failures) {
            return Err(AppError::Browser("scripted launch failure".to_string()));
        }
        if let Some(proxy) = &options.proxy {
            lock(&self.site.launch_proxies).push(proxy.to_string());
        }
        Ok(Box::new(FakeBrowser {
            site: Arc::clone(&self.site),
        }))
    }
}

struct FakeBrowser {
    site: Arc<FakeSite>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_context(&self, _fingerprint: &SessionFingerprint) -> Result<Box<dyn ContextHandle>> {
        Ok(Box::new(FakeContext {
            site: Arc::clone(&self.site),
        }))
    }

    async fn close(&self) -> Result<()> {
        lock(&self.site.close_log).push("browser");
        Ok(())
    }
}

struct FakeContext {
    site: Arc<FakeSite>,
}

#[async_trait]
impl ContextHandle for FakeContext {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        if FakeSite::take_failure(&self.site.new_page_failures) {
            return Err(AppError::Browser("scripted page failure".to_string()));
        }
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(&self) -> Result<()> {
        lock(&self.site.close_log).push("context");
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    scrolls: usize,
    reads: usize,
}

struct FakePage {
    site: Arc<FakeSite>,
    state: Mutex<PageState>,
}

impl FakePage {
    fn stage(&self, count_read: bool) -> (String, usize) {
        let mut state = lock(&self.state);
        let route = lock(&self.site.routes).get(&state.url).cloned();
        let Some(route) = route else {
            return (String::new(), 0);
        };
        let step = match route.advance {
            Advance::OnScroll => state.scrolls,
            Advance::OnRead => state.reads,
        };
        if count_read {
            state.reads += 1;
        }
        let idx = step.min(route.stages.len().saturating_sub(1));
        (route.stages.get(idx).cloned().unwrap_or_default(), idx)
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn add_init_script(&self, _source: &str) -> Result<()> {
        self.site.init_scripts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn goto(&self, url: &str, _wait: WaitPolicy, _timeout: Duration) -> Result<NavigationResponse> {
        lock(&self.site.navigations).push(url.to_string());
        {
            let mut failures = lock(&self.site.goto_failures);
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(AppError::Browser(format!("scripted navigation failure: {url}")));
                }
            }
        }

        let status = lock(&self.site.routes).get(url).map(|r| r.status).unwrap_or(404);
        *lock(&self.state) = PageState {
            url: url.to_string(),
            ..PageState::default()
        };
        Ok(NavigationResponse {
            status: Some(status),
            url: url.to_string(),
        })
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        match expression {
            scripts::SCROLL_BY_VIEWPORT => {
                lock(&self.state).scrolls += 1;
                self.site.scrolls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Bool(true))
            }
            scripts::SCROLL_HEIGHT => {
                let (_, idx) = self.stage(false);
                Ok(Value::from(1000 * (idx as u64 + 1)))
            }
            scripts::READY_STATE => Ok(Value::from("complete")),
            scripts::OUTER_HTML => Ok(Value::from(self.content().await?)),
            scripts::LOCATION_HREF => Ok(Value::from(lock(&self.state).url.clone())),
            _ => Ok(Value::Null),
        }
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        let (html, _) = self.stage(false);
        let parsed = scraper::Selector::parse(selector)
            .map_err(|e| AppError::Browser(format!("bad selector {selector}: {e}")))?;
        if scraper::Html::parse_document(&html).select(&parsed).next().is_some() {
            Ok(())
        } else {
            Err(AppError::Timeout(format!("waiting for {selector}")))
        }
    }

    async fn content(&self) -> Result<String> {
        Ok(self.stage(true).0)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(lock(&self.state).url.clone())
    }

    async fn close(&self) -> Result<()> {
        lock(&self.site.close_log).push("page");
        Ok(())
    }
}
