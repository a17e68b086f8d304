use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::cache::CacheStore;
use crate::db::now_secs;
use crate::error::Result;
use crate::scrape::fuzzy::normalize_name;
use crate::scrape::MatchSource;
use crate::types::{MatchQuery, MatchRecord, WeatherSnapshot};
use crate::weather::WeatherFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub match_record: Duration,
    pub weather: Duration,
}

/// Cache-aside assembly of match records.
///
/// A hit never touches the network. A miss runs the site extraction and the
/// weather lookup concurrently, merges them and writes the record back. There
/// is no cross-caller de-duplication: two concurrent misses build twice.
pub struct MatchAggregator {
    source: Arc<dyn MatchSource>,
    weather: Arc<WeatherFetcher>,
    cache: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl MatchAggregator {
    pub fn new(
        source: Arc<dyn MatchSource>,
        weather: Arc<WeatherFetcher>,
        cache: Arc<dyn CacheStore>,
        ttls: CacheTtls,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            weather,
            cache,
            ttls,
            health,
            latency,
        })
    }

    pub async fn get_or_build(&self, query: &MatchQuery) -> Result<MatchRecord> {
        let slot = query.key().cache_slot(query.sport);

        if let Some(record) = self.cached::<MatchRecord>(&slot).await {
            self.health.record_hit();
            debug!(slot, "Match record served from cache");
            return Ok(record);
        }
        self.health.record_miss();

        let started = Instant::now();
        let (facts, weather) = tokio::join!(
            self.source.extract(query),
            self.weather_for(&query.home_team),
        );
        let facts = match facts {
            Ok(facts) => facts,
            Err(e) => {
                self.health.record_build(false);
                return Err(e);
            }
        };

        let record = MatchRecord {
            home_team: query.home_team.trim().to_string(),
            away_team: query.away_team.trim().to_string(),
            sport: query.sport,
            league: facts.league,
            venue: facts.venue,
            unavailable_players: facts.unavailable_players,
            recent_results: facts.recent_results,
            lineups: facts.lineups,
            standings: facts.standings,
            weather,
            fetched_at: now_secs(),
        };

        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        self.health.record_build(true);
        info!(slot, elapsed_ms = elapsed.as_millis() as u64, "Match record built");

        self.store(&slot, &record, self.ttls.match_record).await;
        Ok(record)
    }

    /// Weather keyed by the home team's geocode place. The fallback snapshot is
    /// never cached so a transient outage does not stick for a full TTL.
    async fn weather_for(&self, home_team: &str) -> WeatherSnapshot {
        let slot = format!("weather:{}", normalize_name(home_team));
        if let Some(weather) = self.cached::<WeatherSnapshot>(&slot).await {
            return weather;
        }
        let weather = self.weather.for_team(home_team).await;
        if weather != WeatherSnapshot::default() {
            self.store(&slot, &weather, self.ttls.weather).await;
        }
        weather
    }

    /// Read and decode a slot. Read errors and undecodable payloads are misses.
    async fn cached<T: serde::de::DeserializeOwned>(&self, slot: &str) -> Option<T> {
        let bytes = match self.cache.get(slot).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(slot, "Cache read failed, treating as miss: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(slot, "Cached payload undecodable, treating as miss: {e}");
                None
            }
        }
    }

    /// Best-effort write; failures are logged and swallowed.
    async fn store<T: serde::Serialize>(&self, slot: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(slot, "Could not encode cache payload: {e}");
                return;
            }
        };
        if let Err(e) = self.cache.set(slot, &bytes, ttl).await {
            warn!(slot, "Cache write failed: {e}");
        }
    }
}
