use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::accuracy::repo::save_predictions;
use crate::predict::ProviderPrediction;

/// One batch of predictions handed to a caller for a single match.
#[derive(Debug, Clone)]
pub struct IssuedPredictions {
    pub match_slot: String,
    pub league: String,
    pub predictions: Vec<ProviderPrediction>,
}

/// Persists issued predictions to SQLite so they can be graded later.
/// Runs as a dedicated background task; the request path only enqueues.
pub struct PredictionWriter {
    pool: sqlx::SqlitePool,
    rx: mpsc::Receiver<IssuedPredictions>,
}

impl PredictionWriter {
    pub fn new(pool: sqlx::SqlitePool, rx: mpsc::Receiver<IssuedPredictions>) -> Self {
        Self { pool, rx }
    }

    pub async fn run(mut self) {
        while let Some(batch) = self.rx.recv().await {
            match save_predictions(&self.pool, &batch.match_slot, &batch.league, &batch.predictions).await {
                Ok(()) => debug!(
                    slot = %batch.match_slot,
                    count = batch.predictions.len(),
                    "Predictions persisted"
                ),
                Err(e) => error!(slot = %batch.match_slot, "DB write error: {e}"),
            }
        }
    }
}
