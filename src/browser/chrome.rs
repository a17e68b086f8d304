//! Chromium driven over the DevTools protocol.
//!
//! One process per session. The proxy is a process argument, so every page in
//! the process shares it; proxy credentials are answered through the Fetch
//! domain on each page.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::cdp::CdpConnection;
use crate::browser::messages::devtools_url_from_line;
use crate::browser::proxy::ProxyDescriptor;
use crate::browser::scripts;
use crate::browser::session::SessionFingerprint;
use crate::browser::{
    BrowserDriver, BrowserHandle, ContextHandle, LaunchOptions, NavigationResponse, PageHandle,
    WaitPolicy,
};
use crate::config::{BROWSER_LAUNCH_TIMEOUT_MS, CDP_COMMAND_TIMEOUT_MS, PAGE_POLL_INTERVAL_MS};
use crate::error::{AppError, Result};

fn command_timeout() -> Duration {
    Duration::from_millis(CDP_COMMAND_TIMEOUT_MS)
}

fn str_field<'a>(value: &'a Value, field: &str, method: &str) -> Result<&'a str> {
    value[field]
        .as_str()
        .ok_or_else(|| AppError::Browser(format!("{method}: reply has no {field}")))
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct ChromeDriver {
    executable: String,
}

impl ChromeDriver {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn args(options: &LaunchOptions, profile_dir: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-infobars".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--no-sandbox".to_string(),
            format!("--user-data-dir={}", profile_dir.display()),
        ];
        if options.headless {
            args.push("--headless=new".to_string());
        }
        if let Some((w, h)) = options.window_size {
            args.push(format!("--window-size={w},{h}"));
        }
        if let Some(proxy) = &options.proxy {
            args.push(format!("--proxy-server={}", proxy.server_arg()));
        }
        args.push("about:blank".to_string());
        args
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserHandle>> {
        let profile_dir =
            std::env::temp_dir().join(format!("scout-profile-{:016x}", rand::random::<u64>()));
        tokio::fs::create_dir_all(&profile_dir).await?;

        let mut child = Command::new(&self.executable)
            .args(Self::args(options, &profile_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Browser(format!("failed to start {}: {e}", self.executable)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Browser("browser stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(Duration::from_millis(BROWSER_LAUNCH_TIMEOUT_MS), async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(url) = devtools_url_from_line(&line) {
                    return Some(url);
                }
            }
            None
        })
        .await;

        let ws_url = match ws_url {
            Ok(Some(url)) => url,
            Ok(None) => {
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(AppError::Browser("browser exited before DevTools was ready".to_string()));
            }
            Err(_) => {
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(AppError::Timeout("browser launch".to_string()));
            }
        };

        // Keep draining stderr so the pipe never blocks the browser.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "chromium", "{line}");
            }
        });

        let conn = match CdpConnection::connect(&ws_url).await {
            Ok(conn) => conn,
            Err(e) => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(e);
            }
        };

        info!(
            pid = child.id().unwrap_or_default(),
            proxy = ?options.proxy.as_ref().map(|p| p.to_string()),
            "Browser launched"
        );

        Ok(Box::new(ChromeBrowser {
            conn,
            child: Mutex::new(Some(child)),
            profile_dir,
            proxy: options.proxy.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Browser process
// ---------------------------------------------------------------------------

pub struct ChromeBrowser {
    conn: Arc<CdpConnection>,
    child: Mutex<Option<Child>>,
    profile_dir: PathBuf,
    proxy: Option<ProxyDescriptor>,
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn new_context(&self, fingerprint: &SessionFingerprint) -> Result<Box<dyn ContextHandle>> {
        let reply = self
            .conn
            .call(
                "Target.createBrowserContext",
                json!({ "disposeOnDetach": true }),
                None,
                command_timeout(),
            )
            .await?;
        let context_id = str_field(&reply, "browserContextId", "Target.createBrowserContext")?;

        Ok(Box::new(ChromeContext {
            conn: Arc::clone(&self.conn),
            context_id: context_id.to_string(),
            fingerprint: fingerprint.clone(),
            proxy: self.proxy.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.conn.is_closed() {
            if let Err(e) = self
                .conn
                .call("Browser.close", json!({}), None, command_timeout())
                .await
            {
                debug!("Browser.close failed: {e}");
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), child.wait())
                .await
                .is_err()
            {
                warn!("Browser did not exit, killing");
                let _ = child.kill().await;
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(dir = %self.profile_dir.display(), "Profile cleanup failed: {e}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Isolated context
// ---------------------------------------------------------------------------

pub struct ChromeContext {
    conn: Arc<CdpConnection>,
    context_id: String,
    fingerprint: SessionFingerprint,
    proxy: Option<ProxyDescriptor>,
}

#[async_trait]
impl ContextHandle for ChromeContext {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let reply = self
            .conn
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": self.context_id }),
                None,
                command_timeout(),
            )
            .await?;
        let target_id = str_field(&reply, "targetId", "Target.createTarget")?.to_string();

        let reply = self
            .conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
                command_timeout(),
            )
            .await?;
        let session_id = str_field(&reply, "sessionId", "Target.attachToTarget")?.to_string();

        let mut page = ChromePage {
            conn: Arc::clone(&self.conn),
            target_id,
            session_id,
            auth_task: None,
        };
        if let Err(e) = page.configure(&self.fingerprint, self.proxy.as_ref()).await {
            let _ = page.close().await;
            return Err(e);
        }
        Ok(Box::new(page))
    }

    async fn close(&self) -> Result<()> {
        self.conn
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
                None,
                command_timeout(),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

pub struct ChromePage {
    conn: Arc<CdpConnection>,
    target_id: String,
    session_id: String,
    auth_task: Option<JoinHandle<()>>,
}

impl ChromePage {
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.conn
            .call(method, params, Some(&self.session_id), timeout)
            .await
    }

    async fn configure(
        &mut self,
        fingerprint: &SessionFingerprint,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<()> {
        let t = command_timeout();
        self.call("Page.enable", json!({}), t).await?;
        self.call("Runtime.enable", json!({}), t).await?;
        self.call("Network.enable", json!({}), t).await?;
        self.call(
            "Emulation.setUserAgentOverride",
            json!({
                "userAgent": fingerprint.user_agent,
                "acceptLanguage": fingerprint.accept_language,
            }),
            t,
        )
        .await?;
        self.call(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": fingerprint.viewport.width,
                "height": fingerprint.viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
            t,
        )
        .await?;
        self.call(
            "Network.setExtraHTTPHeaders",
            json!({ "headers": { "Accept-Language": fingerprint.accept_language } }),
            t,
        )
        .await?;

        if let Some((username, password)) = proxy.and_then(|p| p.credentials()) {
            // Subscribe before enabling so the first challenge is not missed.
            self.auth_task = Some(self.spawn_proxy_auth(username.to_string(), password.to_string()));
            self.call(
                "Fetch.enable",
                json!({ "handleAuthRequests": true, "patterns": [{ "urlPattern": "*" }] }),
                t,
            )
            .await?;
        }
        Ok(())
    }

    /// Answer proxy auth challenges and release every paused request.
    fn spawn_proxy_auth(&self, username: String, password: String) -> JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        let session_id = self.session_id.clone();
        let mut events = conn.subscribe();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Proxy auth listener lagged");
                        continue;
                    }
                    Err(_) => break,
                };
                if event.session_id.as_deref() != Some(session_id.as_str()) {
                    continue;
                }
                let Some(request_id) = event.params["requestId"].as_str() else {
                    continue;
                };
                let (method, params) = match event.method.as_str() {
                    "Fetch.authRequired" => (
                        "Fetch.continueWithAuth",
                        json!({
                            "requestId": request_id,
                            "authChallengeResponse": {
                                "response": "ProvideCredentials",
                                "username": username,
                                "password": password,
                            },
                        }),
                    ),
                    "Fetch.requestPaused" => {
                        ("Fetch.continueRequest", json!({ "requestId": request_id }))
                    }
                    _ => continue,
                };
                if let Err(e) = conn
                    .call(method, params, Some(&session_id), command_timeout())
                    .await
                {
                    debug!("{method} failed: {e}");
                }
            }
        })
    }

    async fn ready_state(&self) -> Result<String> {
        Ok(self
            .evaluate(scripts::READY_STATE)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.call(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": source }),
            command_timeout(),
        )
        .await?;
        Ok(())
    }

    async fn goto(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<NavigationResponse> {
        let deadline = tokio::time::Instant::now() + timeout;

        let reply = self.call("Page.navigate", json!({ "url": url }), timeout).await?;
        if let Some(reason) = reply["errorText"].as_str().filter(|s| !s.is_empty()) {
            return Err(AppError::PageLoadError {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }

        loop {
            let state = self.ready_state().await?;
            let done = match wait {
                WaitPolicy::DomContentLoaded => state == "interactive" || state == "complete",
                WaitPolicy::Load => state == "complete",
            };
            if done {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::Timeout(format!("navigation to {url}")));
            }
            tokio::time::sleep(Duration::from_millis(PAGE_POLL_INTERVAL_MS)).await;
        }

        let status = self
            .evaluate(scripts::NAVIGATION_STATUS)
            .await?
            .as_u64()
            .filter(|s| *s > 0)
            .and_then(|s| u16::try_from(s).ok());
        let final_url = self.current_url().await.unwrap_or_else(|_| url.to_string());

        Ok(NavigationResponse {
            status,
            url: final_url,
        })
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let reply = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                command_timeout(),
            )
            .await?;

        if let Some(details) = reply.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("script exception");
            return Err(AppError::Browser(format!("evaluate: {text}")));
        }
        Ok(reply["result"]["value"].clone())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let check = scripts::selector_present(selector);
        loop {
            if self.evaluate(&check).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::Timeout(format!("waiting for {selector}")));
            }
            tokio::time::sleep(Duration::from_millis(PAGE_POLL_INTERVAL_MS)).await;
        }
    }

    async fn content(&self) -> Result<String> {
        Ok(self
            .evaluate(scripts::OUTER_HTML)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .evaluate(scripts::LOCATION_HREF)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn close(&self) -> Result<()> {
        if let Some(task) = &self.auth_task {
            task.abort();
        }
        self.conn
            .call(
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
                None,
                command_timeout(),
            )
            .await?;
        Ok(())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::proxy::parse_proxy;

    #[test]
    fn launch_args_carry_headless_window_and_proxy() {
        let options = LaunchOptions {
            headless: true,
            proxy: Some(parse_proxy("u:p@10.1.1.1:8080").unwrap()),
            window_size: Some((1920, 1080)),
        };
        let args = ChromeDriver::args(&options, std::path::Path::new("/tmp/profile-x"));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
        assert!(args.contains(&"--proxy-server=http://10.1.1.1:8080".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile-x".to_string()));
        assert!(args.iter().all(|a| !a.contains("u:p")));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn headed_launch_without_proxy() {
        let args = ChromeDriver::args(&LaunchOptions::default(), std::path::Path::new("/tmp/p"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }
}
