use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accuracy::AccuracyTracker;
use crate::error::{AppError, Result};
use crate::predict::prompt::build_prompt;
use crate::predict::provider::PredictionProvider;
use crate::predict::schema::{parse_prediction, Prediction};
use crate::types::MatchRecord;

/// A validated prediction tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPrediction {
    pub provider: String,
    pub prediction: Prediction,
}

struct Ranked {
    weight: f64,
    inner: ProviderPrediction,
}

/// Order by descending accuracy weight. Ties keep their input order; the
/// weight never filters.
pub fn rank(tracker: &AccuracyTracker, league: &str, predictions: Vec<ProviderPrediction>) -> Vec<ProviderPrediction> {
    let mut ranked: Vec<Ranked> = predictions
        .into_iter()
        .map(|inner| Ranked {
            weight: tracker.weight(&inner.provider, league),
            inner,
        })
        .collect();
    ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    ranked.into_iter().map(|r| r.inner).collect()
}

pub struct PredictionFanout {
    providers: Vec<Arc<dyn PredictionProvider>>,
    tracker: Arc<AccuracyTracker>,
    timeout: Duration,
}

impl PredictionFanout {
    pub fn new(
        providers: Vec<Arc<dyn PredictionProvider>>,
        tracker: Arc<AccuracyTracker>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            providers,
            tracker,
            timeout,
        })
    }

    /// Ask every provider concurrently. A failure, timeout or schema violation
    /// drops only that provider's answer.
    pub async fn predict(&self, record: &MatchRecord) -> Result<Vec<ProviderPrediction>> {
        let prompt = build_prompt(record);
        let calls = self.providers.iter().map(|provider| {
            let prompt = prompt.as_str();
            async move {
                let name = provider.name().to_string();
                let raw = match tokio::time::timeout(self.timeout, provider.complete(prompt)).await {
                    Ok(Ok(raw)) => raw,
                    Ok(Err(e)) => {
                        warn!(provider = %name, "Provider call failed: {e}");
                        return None;
                    }
                    Err(_) => {
                        warn!(provider = %name, timeout_ms = self.timeout.as_millis() as u64, "Provider timed out");
                        return None;
                    }
                };
                match parse_prediction(&raw) {
                    Ok(prediction) => Some(ProviderPrediction {
                        provider: name,
                        prediction,
                    }),
                    Err(e) => {
                        warn!(provider = %name, "Discarding prediction: {e}");
                        None
                    }
                }
            }
        });

        let valid: Vec<ProviderPrediction> = join_all(calls).await.into_iter().flatten().collect();
        if valid.is_empty() {
            return Err(AppError::AllPredictionsInvalid {
                attempted: self.providers.len(),
            });
        }

        info!(
            valid = valid.len(),
            attempted = self.providers.len(),
            league = %record.league,
            "Predictions collected"
        );
        Ok(rank(&self.tracker, &record.league, valid))
    }
}
