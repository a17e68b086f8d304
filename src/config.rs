use std::str::FromStr;
use std::time::Duration;

use crate::aggregator::CacheTtls;
use crate::browser::proxy::{parse_proxy_list, ProxyDescriptor};
use crate::browser::retry::RetryPolicy;
use crate::browser::session::{SessionSettings, Viewport};
use crate::error::{AppError, Result};
use crate::limiter::RateLimit;
use crate::scrape::ExtractorSettings;

pub const SITE_BASE_URL: &str = "https://www.flashscore.com";
pub const GEOCODING_API_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const CHROME_PATH: &str = "chromium";

/// Scraping ceiling: requests per window against the scraped site.
pub const SCRAPE_RATE_LIMIT: u32 = 5;
pub const SCRAPE_RATE_WINDOW_MS: u64 = 10_000;

/// Auxiliary APIs (geocoding, weather, prediction providers) get a looser bound.
pub const AUX_RATE_LIMIT: u32 = 30;
pub const AUX_RATE_WINDOW_MS: u64 = 60_000;

pub const RETRY_MAX_ATTEMPTS: u32 = 3;
/// Fixed inter-attempt delay, not exponential.
pub const RETRY_DELAY_MS: u64 = 1_000;

pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const ELEMENT_TIMEOUT_MS: u64 = 10_000;
/// How long a challenge interstitial may take to clear on its own.
pub const CHALLENGE_GRACE_MS: u64 = 5_000;

pub const MAX_SCROLL_ATTEMPTS: u32 = 30;
/// Consecutive scrolls with an unchanged scroll height before the listing counts as exhausted.
pub const MAX_STALE_SCROLLS: u32 = 3;
pub const SCROLL_DELAY_MS: u64 = 750;
pub const RECENT_RESULTS_LIMIT: usize = 5;

pub const CACHE_TTL_MATCH_SECS: u64 = 6 * 3600;
pub const CACHE_TTL_WEATHER_SECS: u64 = 3600;

pub const PREDICTION_TIMEOUT_MS: u64 = 60_000;

/// Capacity of the issued-predictions queue feeding the background writer.
pub const CHANNEL_CAPACITY: usize = 1_024;
pub const CACHE_PURGE_INTERVAL_SECS: u64 = 600;

/// Outcomes a provider needs within one league before its league ratio is trusted.
pub const LEAGUE_MIN_OUTCOMES: u64 = 10;
/// Multiplier applied to a trusted league ratio to prefer specialization.
pub const LEAGUE_WEIGHT_MULTIPLIER: f64 = 2.0;
/// Weight for a provider with no recorded outcomes.
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// Outbound frame queue and event fan-out capacity of one DevTools connection.
pub const CDP_CHANNEL_CAPACITY: usize = 256;
/// Upper bound for a single DevTools command that is not a navigation.
pub const CDP_COMMAND_TIMEOUT_MS: u64 = 15_000;
/// How long Chromium may take to print its DevTools endpoint.
pub const BROWSER_LAUNCH_TIMEOUT_MS: u64 = 20_000;
/// Poll interval for ready-state, selector and challenge checks.
pub const PAGE_POLL_INTERVAL_MS: u64 = 100;

pub const VIEWPORT_WIDTH: u32 = 1920;
pub const VIEWPORT_HEIGHT: u32 = 1080;
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// One OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub api_url: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub site_base_url: String,
    pub chrome_path: String,
    pub browser_headless: bool,
    pub scrape_rate_limit: u32,
    pub scrape_rate_window_ms: u64,
    pub aux_rate_limit: u32,
    pub aux_rate_window_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Bind each new browser session to the next proxy (PROXY_ENABLED)
    pub proxy_enabled: bool,
    /// `[user:pass@]host:port`, comma-separated (PROXY_LIST)
    pub proxies: Vec<ProxyDescriptor>,
    pub navigation_timeout_ms: u64,
    pub element_timeout_ms: u64,
    pub challenge_grace_ms: u64,
    pub max_scroll_attempts: u32,
    pub max_stale_scrolls: u32,
    pub scroll_delay_ms: u64,
    pub recent_results_limit: usize,
    pub cache_ttl_match_secs: u64,
    pub cache_ttl_weather_secs: u64,
    pub geocoding_api_url: String,
    pub weather_api_url: String,
    pub providers: Vec<ProviderConfig>,
    pub prediction_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let proxies = parse_proxy_list(&std::env::var("PROXY_LIST").unwrap_or_default())?;
        let proxy_enabled = env_or("PROXY_ENABLED", false)?;
        if proxy_enabled && proxies.is_empty() {
            return Err(AppError::Config(
                "PROXY_ENABLED is set but PROXY_LIST is empty".to_string(),
            ));
        }

        let retry_max_attempts = env_or("RETRY_MAX_ATTEMPTS", RETRY_MAX_ATTEMPTS)?;
        if retry_max_attempts == 0 {
            return Err(AppError::Config(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "scout.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            site_base_url: std::env::var("SITE_BASE_URL")
                .unwrap_or_else(|_| SITE_BASE_URL.to_string()),
            chrome_path: std::env::var("CHROME_PATH").unwrap_or_else(|_| CHROME_PATH.to_string()),
            browser_headless: env_or("BROWSER_HEADLESS", true)?,
            scrape_rate_limit: env_or("SCRAPE_RATE_LIMIT", SCRAPE_RATE_LIMIT)?,
            scrape_rate_window_ms: env_or("SCRAPE_RATE_WINDOW_MS", SCRAPE_RATE_WINDOW_MS)?,
            aux_rate_limit: env_or("AUX_RATE_LIMIT", AUX_RATE_LIMIT)?,
            aux_rate_window_ms: env_or("AUX_RATE_WINDOW_MS", AUX_RATE_WINDOW_MS)?,
            retry_max_attempts,
            retry_delay_ms: env_or("RETRY_DELAY_MS", RETRY_DELAY_MS)?,
            proxy_enabled,
            proxies,
            navigation_timeout_ms: env_or("NAVIGATION_TIMEOUT_MS", NAVIGATION_TIMEOUT_MS)?,
            element_timeout_ms: env_or("ELEMENT_TIMEOUT_MS", ELEMENT_TIMEOUT_MS)?,
            challenge_grace_ms: env_or("CHALLENGE_GRACE_MS", CHALLENGE_GRACE_MS)?,
            max_scroll_attempts: env_or("MAX_SCROLL_ATTEMPTS", MAX_SCROLL_ATTEMPTS)?,
            max_stale_scrolls: env_or("MAX_STALE_SCROLLS", MAX_STALE_SCROLLS)?,
            scroll_delay_ms: env_or("SCROLL_DELAY_MS", SCROLL_DELAY_MS)?,
            recent_results_limit: env_or("RECENT_RESULTS_LIMIT", RECENT_RESULTS_LIMIT)?,
            cache_ttl_match_secs: env_or("CACHE_TTL_MATCH_SECS", CACHE_TTL_MATCH_SECS)?,
            cache_ttl_weather_secs: env_or("CACHE_TTL_WEATHER_SECS", CACHE_TTL_WEATHER_SECS)?,
            geocoding_api_url: std::env::var("GEOCODING_API_URL")
                .unwrap_or_else(|_| GEOCODING_API_URL.to_string()),
            weather_api_url: std::env::var("WEATHER_API_URL")
                .unwrap_or_else(|_| WEATHER_API_URL.to_string()),
            providers: providers_from_env()?,
            prediction_timeout_ms: env_or("PREDICTION_TIMEOUT_MS", PREDICTION_TIMEOUT_MS)?,
        })
    }

    pub fn scrape_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.scrape_rate_limit,
            Duration::from_millis(self.scrape_rate_window_ms),
        )
    }

    pub fn aux_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.aux_rate_limit,
            Duration::from_millis(self.aux_rate_window_ms),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            headless: self.browser_headless,
            viewport: Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
            },
            accept_language: ACCEPT_LANGUAGE.to_string(),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            element_timeout: Duration::from_millis(self.element_timeout_ms),
            challenge_grace: Duration::from_millis(self.challenge_grace_ms),
        }
    }

    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            base_url: self.site_base_url.trim_end_matches('/').to_string(),
            max_scroll_attempts: self.max_scroll_attempts,
            max_stale_scrolls: self.max_stale_scrolls,
            scroll_delay: Duration::from_millis(self.scroll_delay_ms),
            recent_results_limit: self.recent_results_limit,
        }
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            match_record: Duration::from_secs(self.cache_ttl_match_secs),
            weather: Duration::from_secs(self.cache_ttl_weather_secs),
        }
    }
}

/// Read `PREDICTION_PROVIDERS=openai,deepseek` and, per name, `<NAME>_API_URL`,
/// `<NAME>_MODEL` and `<NAME>_API_KEY`.
fn providers_from_env() -> Result<Vec<ProviderConfig>> {
    let names: Vec<String> = std::env::var("PREDICTION_PROVIDERS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut providers = Vec::with_capacity(names.len());
    for name in names {
        let prefix = name.to_uppercase().replace('-', "_");
        let var = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            std::env::var(&key).map_err(|_| AppError::Config(format!("{key} must be set")))
        };
        providers.push(ProviderConfig {
            api_url: var("API_URL")?,
            model: var("MODEL")?,
            api_key: var("API_KEY")?,
            name,
        });
    }
    Ok(providers)
}

/// Unset means `default`; a set value must parse.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(key: &str, raw: Option<&str>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {v:?}"))),
    }
}
