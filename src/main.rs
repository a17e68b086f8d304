mod accuracy;
mod aggregator;
mod api;
mod browser;
mod cache;
mod config;
mod db;
mod error;
mod limiter;
mod predict;
mod scrape;
mod types;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::accuracy::repo::load_tracker;
use crate::aggregator::MatchAggregator;
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::{router, ApiState};
use crate::browser::chrome::ChromeDriver;
use crate::browser::proxy::ProxyRotation;
use crate::browser::{RetryExecutor, SessionManager};
use crate::cache::SqliteCacheStore;
use crate::config::{Config, CACHE_PURGE_INTERVAL_SECS, CHANNEL_CAPACITY};
use crate::db::PredictionWriter;
use crate::error::Result;
use crate::limiter::HostRateLimiter;
use crate::predict::{HttpChatProvider, PredictionFanout, PredictionProvider};
use crate::scrape::SiteExtractor;
use crate::weather::{OpenMeteoClient, WeatherFetcher};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Shared singletons ---
    let scrape_limiter = HostRateLimiter::new(cfg.scrape_rate_limit());
    let aux_limiter = HostRateLimiter::new(cfg.aux_rate_limit());
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let tracker = Arc::new(load_tracker(&pool).await?);

    let proxies = if cfg.proxy_enabled {
        info!(count = cfg.proxies.len(), "Proxy rotation enabled");
        Some(Arc::new(ProxyRotation::new(cfg.proxies.clone())))
    } else {
        None
    };

    // --- Acquisition ---
    let sessions = SessionManager::new(
        Arc::new(ChromeDriver::new(cfg.chrome_path.clone())),
        scrape_limiter,
        proxies,
        cfg.session_settings(),
    );
    let retry = RetryExecutor::new(sessions, cfg.retry_policy());
    let extractor = SiteExtractor::new(retry, cfg.extractor_settings());

    let open_meteo = OpenMeteoClient::new(
        &cfg.geocoding_api_url,
        &cfg.weather_api_url,
        Arc::clone(&aux_limiter),
    )?;
    let weather = WeatherFetcher::new(open_meteo.clone(), open_meteo);

    let cache = SqliteCacheStore::new(pool.clone());
    let aggregator = MatchAggregator::new(
        extractor,
        weather,
        cache.clone(),
        cfg.cache_ttls(),
        Arc::clone(&health),
        Arc::clone(&latency),
    );

    // --- Prediction providers ---
    let timeout = Duration::from_millis(cfg.prediction_timeout_ms);
    let mut providers: Vec<Arc<dyn PredictionProvider>> = Vec::with_capacity(cfg.providers.len());
    for provider in &cfg.providers {
        providers.push(HttpChatProvider::new(provider.clone(), Arc::clone(&aux_limiter), timeout)?);
    }
    if providers.is_empty() {
        warn!("PREDICTION_PROVIDERS not set, /predictions will fail. Example: PREDICTION_PROVIDERS=openai and OPENAI_API_URL, OPENAI_MODEL, OPENAI_API_KEY");
    } else {
        info!(
            "Prediction providers configured ({})",
            cfg.providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
        );
    }
    let fanout = PredictionFanout::new(providers, Arc::clone(&tracker), timeout);

    // --- Background tasks ---
    let (issued_tx, issued_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = PredictionWriter::new(pool.clone(), issued_rx);
    tokio::spawn(async move { writer.run().await });

    // Expired cache rows (every CACHE_PURGE_INTERVAL_SECS)
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(CACHE_PURGE_INTERVAL_SECS));
        loop {
            tick.tick().await;
            match cache.purge_expired().await {
                Ok(0) => {}
                Ok(n) => debug!(removed = n, "Purged expired cache rows"),
                Err(e) => warn!("Cache purge failed: {e}"),
            }
        }
    });

    // --- HTTP API server ---
    let api_state = ApiState {
        aggregator,
        fanout,
        tracker,
        pool,
        health,
        latency,
        issued_tx,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
