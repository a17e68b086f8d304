//! Headless-browser access.
//!
//! The core only depends on the driver traits below; `chrome` implements them
//! over the Chrome DevTools Protocol and tests substitute a scripted fake.

pub mod cdp;
pub mod chrome;
pub mod messages;
pub mod proxy;
pub mod retry;
pub mod session;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::browser::proxy::ProxyDescriptor;
use crate::browser::session::SessionFingerprint;

pub use retry::{RetryExecutor, RetryPolicy};
pub use session::{BrowserSession, SessionManager};

/// Process-level launch options. A proxy is bound for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<ProxyDescriptor>,
    pub window_size: Option<(u32, u32)>,
}

/// When `goto` considers a navigation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    DomContentLoaded,
    Load,
}

#[derive(Debug, Clone)]
pub struct NavigationResponse {
    /// Main-document HTTP status; None when the driver could not observe it.
    pub status: Option<u16>,
    pub url: String,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserHandle>>;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_context(&self, fingerprint: &SessionFingerprint) -> Result<Box<dyn ContextHandle>>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait ContextHandle: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Install a script that runs before any page script on every new document.
    async fn add_init_script(&self, source: &str) -> Result<()>;
    async fn goto(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<NavigationResponse>;
    /// Evaluate `expression` in the page and return its JSON value (promises awaited).
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn content(&self) -> Result<String>;
    async fn current_url(&self) -> Result<String>;
    async fn close(&self) -> Result<()>;
}

/// Page-script snippets shared by the session layer and the drivers.
pub mod scripts {
    pub const SCROLL_BY_VIEWPORT: &str = "window.scrollBy(0, window.innerHeight); true";
    pub const SCROLL_HEIGHT: &str = "document.body ? document.body.scrollHeight : 0";
    pub const READY_STATE: &str = "document.readyState";
    pub const OUTER_HTML: &str = "document.documentElement ? document.documentElement.outerHTML : ''";
    pub const LOCATION_HREF: &str = "location.href";
    pub const NAVIGATION_STATUS: &str = "(() => { const e = performance.getEntriesByType('navigation')[0]; return e && e.responseStatus ? e.responseStatus : 0; })()";

    /// Runs before any page script: hides the usual automation markers.
    pub const STEALTH: &str = r#"
(() => {
  Object.defineProperty(navigator, 'webdriver', { get: () => false });
  Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
  Object.defineProperty(navigator, 'plugins', {
    get: () => [
      { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
      { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
      { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    ],
  });
  window.chrome = window.chrome || { runtime: {} };
  const query = window.navigator.permissions && window.navigator.permissions.query;
  if (query) {
    window.navigator.permissions.query = (p) =>
      p && p.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : query.call(window.navigator.permissions, p);
  }
})();
"#;

    /// `document.querySelector(<selector>) !== null`, with the selector JSON-escaped.
    pub fn selector_present(selector: &str) -> String {
        let quoted = serde_json::Value::String(selector.to_string()).to_string();
        format!("document.querySelector({quoted}) !== null")
    }
}
