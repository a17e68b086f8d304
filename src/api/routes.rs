use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::accuracy::repo::{grade_match, GradeSummary};
use crate::accuracy::{AccuracyRecord, AccuracyTracker};
use crate::aggregator::MatchAggregator;
use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencySnapshot, LatencyStats};
use crate::db::writer::IssuedPredictions;
use crate::error::AppError;
use crate::predict::{PredictionFanout, ProviderPrediction};
use crate::types::{MatchKey, MatchQuery, MatchRecord, Sport};

#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Arc<MatchAggregator>,
    pub fanout: Arc<PredictionFanout>,
    pub tracker: Arc<AccuracyTracker>,
    pub pool: sqlx::SqlitePool,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub issued_tx: mpsc::Sender<IssuedPredictions>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/matches", post(post_match))
        .route("/predictions", post(post_predictions))
        .route("/matches/:sport/:key/result", post(post_result))
        .route("/accuracy", get(get_accuracy))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub home_score: u32,
    pub away_score: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionsResponse {
    #[serde(rename = "match")]
    pub record: MatchRecord,
    pub predictions: Vec<ProviderPrediction>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

fn validate(query: &MatchQuery) -> Result<(), AppError> {
    if query.home_team.trim().is_empty() || query.away_team.trim().is_empty() {
        return Err(AppError::BadRequest(
            "homeTeam and awayTeam must be non-empty".to_string(),
        ));
    }
    if MatchKey::new(&query.home_team, &query.away_team)
        == MatchKey::new(&query.away_team, &query.home_team)
    {
        return Err(AppError::BadRequest("a team cannot play itself".to_string()));
    }
    Ok(())
}

async fn post_match(
    State(state): State<ApiState>,
    Json(query): Json<MatchQuery>,
) -> Result<Json<MatchRecord>, AppError> {
    validate(&query)?;
    let record = state.aggregator.get_or_build(&query).await?;
    Ok(Json(record))
}

async fn post_predictions(
    State(state): State<ApiState>,
    Json(query): Json<MatchQuery>,
) -> Result<Json<PredictionsResponse>, AppError> {
    validate(&query)?;
    let record = state.aggregator.get_or_build(&query).await?;
    let predictions = state.fanout.predict(&record).await?;

    let batch = IssuedPredictions {
        match_slot: record.key().cache_slot(record.sport),
        league: record.league.clone(),
        predictions: predictions.clone(),
    };
    if let Err(e) = state.issued_tx.try_send(batch) {
        warn!("Prediction writer channel full: {e}");
    }
    state.health.add_predictions_served(predictions.len() as u64);

    Ok(Json(PredictionsResponse { record, predictions }))
}

async fn post_result(
    State(state): State<ApiState>,
    Path((sport, key)): Path<(String, String)>,
    Json(score): Json<FinalScore>,
) -> Result<Json<GradeSummary>, AppError> {
    let sport: Sport = sport.parse().map_err(AppError::BadRequest)?;
    let key = MatchKey::from_raw(&key);
    if key.as_str().is_empty() {
        return Err(AppError::BadRequest("match key must be non-empty".to_string()));
    }
    let slot = key.cache_slot(sport);
    let summary = grade_match(
        &state.pool,
        &state.tracker,
        &slot,
        score.home_score,
        score.away_score,
    )
    .await?;
    Ok(Json(summary))
}

async fn get_accuracy(State(state): State<ApiState>) -> Json<BTreeMap<String, AccuracyRecord>> {
    Json(state.tracker.snapshot())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySnapshot> {
    Json(state.latency.snapshot())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::accuracy::repo::save_predictions;
    use crate::aggregator::CacheTtls;
    use crate::cache::MemoryCacheStore;
    use crate::db::connect_memory;
    use crate::error::Result;
    use crate::predict::schema::{sample, Outcome};
    use crate::predict::PredictionProvider;
    use crate::scrape::{MatchSource, SiteFacts};
    use crate::weather::{GeoPoint, Geocoder, WeatherFetcher, WeatherLookup};
    use crate::types::WeatherSnapshot;

    struct StaticSource;

    #[async_trait]
    impl MatchSource for StaticSource {
        async fn extract(&self, _query: &MatchQuery) -> Result<SiteFacts> {
            Ok(SiteFacts {
                league: "Premier League".into(),
                ..SiteFacts::default()
            })
        }
    }

    struct NoPlace;

    #[async_trait]
    impl Geocoder for NoPlace {
        async fn geocode(&self, _place: &str) -> Result<Option<GeoPoint>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl WeatherLookup for NoPlace {
        async fn current(&self, _point: &GeoPoint) -> Result<WeatherSnapshot> {
            Ok(WeatherSnapshot::default())
        }
    }

    struct Confident;

    #[async_trait]
    impl PredictionProvider for Confident {
        fn name(&self) -> &str {
            "confident"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(serde_json::to_string(&sample(70, 20, 10)).unwrap())
        }
    }

    async fn state() -> (ApiState, mpsc::Receiver<IssuedPredictions>) {
        let pool = connect_memory().await.unwrap();
        let health = Arc::new(HealthState::new());
        let latency = Arc::new(LatencyStats::new());
        let tracker = Arc::new(AccuracyTracker::new());
        let aggregator = MatchAggregator::new(
            Arc::new(StaticSource),
            WeatherFetcher::new(Arc::new(NoPlace), Arc::new(NoPlace)),
            MemoryCacheStore::new(),
            CacheTtls {
                match_record: Duration::from_secs(60),
                weather: Duration::from_secs(60),
            },
            health.clone(),
            latency.clone(),
        );
        let fanout = PredictionFanout::new(
            vec![Arc::new(Confident) as Arc<dyn PredictionProvider>],
            tracker.clone(),
            Duration::from_secs(5),
        );
        let (issued_tx, issued_rx) = mpsc::channel(4);
        let state = ApiState {
            aggregator,
            fanout,
            tracker,
            pool,
            health,
            latency,
            issued_tx,
        };
        (state, issued_rx)
    }

    #[tokio::test]
    async fn blank_team_is_a_bad_request() {
        let (state, _rx) = state().await;
        let query = MatchQuery::new("Arsenal", "  ", Sport::Football);
        let err = post_match(State(state), Json(query)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn predictions_are_queued_for_grading() {
        let (state, mut rx) = state().await;
        let query = MatchQuery::new("Arsenal", "Chelsea", Sport::Football);
        let Json(resp) = post_predictions(State(state.clone()), Json(query)).await.unwrap();

        assert_eq!(resp.predictions.len(), 1);
        assert_eq!(resp.record.league, "Premier League");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.match_slot, "match:football:arsenal-chelsea");
        assert_eq!(state.health.snapshot().predictions_served, 1);
    }

    #[tokio::test]
    async fn result_grades_stored_predictions() {
        let (state, _rx) = state().await;
        save_predictions(
            &state.pool,
            "match:football:arsenal-chelsea",
            "Premier League",
            &[ProviderPrediction {
                provider: "confident".into(),
                prediction: sample(70, 20, 10),
            }],
        )
        .await
        .unwrap();

        let Json(summary) = post_result(
            State(state.clone()),
            Path(("football".to_string(), "Arsenal-Chelsea".to_string())),
            Json(FinalScore {
                home_score: 3,
                away_score: 1,
            }),
        )
        .await
        .unwrap();
        assert_eq!(summary.outcome, Outcome::Home);
        assert_eq!((summary.graded, summary.correct), (1, 1));

        let Json(accuracy) = get_accuracy(State(state)).await;
        assert_eq!(accuracy["confident"].overall.correct, 1);
    }

    #[tokio::test]
    async fn result_key_is_folded_like_the_stored_slot() {
        let (state, _rx) = state().await;
        let stored = MatchKey::new("Fenerbahçe", "Galatasaray").cache_slot(Sport::Football);
        save_predictions(
            &state.pool,
            &stored,
            "Super Lig",
            &[ProviderPrediction {
                provider: "confident".into(),
                prediction: sample(70, 20, 10),
            }],
        )
        .await
        .unwrap();

        let Json(summary) = post_result(
            State(state),
            Path(("football".to_string(), "Fenerbahçe-Galatasaray".to_string())),
            Json(FinalScore {
                home_score: 1,
                away_score: 0,
            }),
        )
        .await
        .unwrap();
        assert_eq!((summary.graded, summary.correct), (1, 1));
    }

    #[tokio::test]
    async fn unknown_sport_is_a_bad_request() {
        let (state, _rx) = state().await;
        let err = post_result(
            State(state),
            Path(("curling".to_string(), "a-b".to_string())),
            Json(FinalScore {
                home_score: 0,
                away_score: 0,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
