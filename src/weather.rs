use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::limiter::HostRateLimiter;
use crate::types::WeatherSnapshot;

/// Club affixes that confuse a place-name geocoder.
const CLUB_AFFIXES: &[&str] = &[
    "fc", "cf", "ac", "sc", "afc", "sk", "fk", "bk", "cd", "sd", "ud", "rc", "as", "ss", "us",
    "bc", "kk", "jk", "if", "sv", "vfb", "vfl", "tsg", "calcio", "club", "united", "city",
];

#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the place is unknown.
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>>;
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn current(&self, point: &GeoPoint) -> Result<WeatherSnapshot>;
}

/// Team name reduced to something a geocoder can place: "Galatasaray SK" → "Galatasaray".
/// Falls back to the trimmed name when every word is an affix.
pub fn geocode_query(team: &str) -> String {
    let words: Vec<&str> = team
        .split_whitespace()
        .filter(|w| {
            let bare: String = w
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            !CLUB_AFFIXES.contains(&bare.as_str()) && !bare.chars().all(|c| c.is_ascii_digit())
        })
        .collect();
    if words.is_empty() {
        team.trim().to_string()
    } else {
        words.join(" ")
    }
}

/// WMO weather interpretation code → label.
pub fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 | 77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// Open-Meteo
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: u32,
    wind_speed_10m: f64,
}

impl From<CurrentConditions> for WeatherSnapshot {
    fn from(c: CurrentConditions) -> Self {
        WeatherSnapshot {
            temperature: c.temperature_2m,
            condition: describe_weather_code(c.weather_code).to_string(),
            humidity: c.relative_humidity_2m,
            wind_speed: c.wind_speed_10m,
        }
    }
}

/// Keyless geocoding and current-conditions client, throttled by the auxiliary limiter.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    geocoding_url: String,
    weather_url: String,
    limiter: Arc<HostRateLimiter>,
}

impl OpenMeteoClient {
    pub fn new(geocoding_url: &str, weather_url: &str, limiter: Arc<HostRateLimiter>) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Arc::new(Self {
            client,
            geocoding_url: geocoding_url.to_string(),
            weather_url: weather_url.to_string(),
            limiter,
        }))
    }
}

#[async_trait]
impl Geocoder for OpenMeteoClient {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>> {
        self.limiter.acquire_url(&self.geocoding_url).await;
        let resp: GeocodingResponse = self
            .client
            .get(&self.geocoding_url)
            .query(&[("name", place), ("count", "1"), ("language", "en"), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp
            .results
            .and_then(|r| r.into_iter().next())
            .map(|r| GeoPoint {
                name: r.name,
                latitude: r.latitude,
                longitude: r.longitude,
            }))
    }
}

#[async_trait]
impl WeatherLookup for OpenMeteoClient {
    async fn current(&self, point: &GeoPoint) -> Result<WeatherSnapshot> {
        self.limiter.acquire_url(&self.weather_url).await;
        let resp: ForecastResponse = self
            .client
            .get(&self.weather_url)
            .query(&[
                ("latitude", point.latitude.to_string()),
                ("longitude", point.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m".to_string(),
                ),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.current.into())
    }
}

// ---------------------------------------------------------------------------
// WeatherFetcher
// ---------------------------------------------------------------------------

/// Geocode then look up current conditions. Never fails: any error or an
/// unknown place yields `WeatherSnapshot::default()`.
pub struct WeatherFetcher {
    geocoder: Arc<dyn Geocoder>,
    lookup: Arc<dyn WeatherLookup>,
}

impl WeatherFetcher {
    pub fn new(geocoder: Arc<dyn Geocoder>, lookup: Arc<dyn WeatherLookup>) -> Arc<Self> {
        Arc::new(Self { geocoder, lookup })
    }

    pub async fn for_team(&self, team: &str) -> WeatherSnapshot {
        let place = geocode_query(team);
        let point = match self.geocoder.geocode(&place).await {
            Ok(Some(point)) => point,
            Ok(None) => {
                debug!(place, "No geocoding result, using default weather");
                return WeatherSnapshot::default();
            }
            Err(e) => {
                warn!(place, "Geocoding failed, using default weather: {e}");
                return WeatherSnapshot::default();
            }
        };

        match self.lookup.current(&point).await {
            Ok(weather) => weather,
            Err(e) => {
                warn!(place = %point.name, "Weather lookup failed, using default: {e}");
                WeatherSnapshot::default()
            }
        }
    }
}
