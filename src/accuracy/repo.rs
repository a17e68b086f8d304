use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::accuracy::tracker::{AccuracyTracker, Tally};
use crate::db::models::{LeagueAccuracyRow, PredictionRow, ProviderAccuracyRow};
use crate::db::now_secs;
use crate::error::Result;
use crate::predict::schema::{Outcome, Prediction};
use crate::predict::ProviderPrediction;

/// Rebuild the in-memory tracker from the accuracy tables.
pub async fn load_tracker(pool: &SqlitePool) -> Result<AccuracyTracker> {
    let tracker = AccuracyTracker::new();

    let overall: Vec<ProviderAccuracyRow> =
        sqlx::query_as("SELECT provider, correct, total FROM provider_accuracy")
            .fetch_all(pool)
            .await?;
    for row in &overall {
        tracker.load_overall(&row.provider, tally(row.correct, row.total));
    }

    let leagues: Vec<LeagueAccuracyRow> =
        sqlx::query_as("SELECT provider, league, correct, total FROM provider_league_accuracy")
            .fetch_all(pool)
            .await?;
    for row in &leagues {
        tracker.load_league(&row.provider, &row.league, tally(row.correct, row.total));
    }

    info!(
        providers = overall.len(),
        league_rows = leagues.len(),
        "Accuracy tracker loaded"
    );
    Ok(tracker)
}

fn tally(correct: i64, total: i64) -> Tally {
    Tally {
        correct: correct.max(0) as u64,
        total: total.max(0) as u64,
    }
}

/// Insert one ungraded row per issued prediction.
pub async fn save_predictions(
    pool: &SqlitePool,
    match_slot: &str,
    league: &str,
    predictions: &[ProviderPrediction],
) -> Result<()> {
    let now = now_secs();
    let mut tx = pool.begin().await?;
    for p in predictions {
        let payload = serde_json::to_string(&p.prediction)?;
        sqlx::query(
            r#"
            INSERT INTO predictions (match_slot, league, provider, payload, graded, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(match_slot)
        .bind(league)
        .bind(&p.provider)
        .bind(payload)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub outcome: Outcome,
    pub graded: usize,
    pub correct: usize,
}

/// Grade every open prediction for `match_slot` against the final score.
///
/// Counters are persisted and the rows marked graded in one transaction; the
/// tracker is only bumped after the commit, so a failed write leaves both
/// sides unchanged.
pub async fn grade_match(
    pool: &SqlitePool,
    tracker: &AccuracyTracker,
    match_slot: &str,
    home_score: u32,
    away_score: u32,
) -> Result<GradeSummary> {
    let outcome = Outcome::from_score(home_score, away_score);
    let now = now_secs();

    let mut tx = pool.begin().await?;
    let rows: Vec<PredictionRow> = sqlx::query_as(
        "SELECT id, league, provider, payload FROM predictions WHERE match_slot = ? AND graded = 0",
    )
    .bind(match_slot)
    .fetch_all(&mut *tx)
    .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        sqlx::query("UPDATE predictions SET graded = 1 WHERE id = ?")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        let prediction: Prediction = match serde_json::from_str(&row.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(id = row.id, provider = %row.provider, "Stored prediction unreadable, skipping: {e}");
                continue;
            }
        };
        let correct = prediction.likely_outcome() == outcome;
        let hit = i64::from(correct);

        sqlx::query(
            r#"
            INSERT INTO provider_accuracy (provider, correct, total, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(provider) DO UPDATE SET
                correct = correct + excluded.correct,
                total = total + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.provider)
        .bind(hit)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO provider_league_accuracy (provider, league, correct, total)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(provider, league) DO UPDATE SET
                correct = correct + excluded.correct,
                total = total + 1
            "#,
        )
        .bind(&row.provider)
        .bind(&row.league)
        .bind(hit)
        .execute(&mut *tx)
        .await?;

        results.push((row.provider.as_str(), row.league.as_str(), correct));
    }
    tx.commit().await?;

    for (provider, league, correct) in &results {
        tracker.record_outcome(provider, league, *correct);
    }

    let summary = GradeSummary {
        outcome,
        graded: results.len(),
        correct: results.iter().filter(|(_, _, c)| *c).count(),
    };
    info!(
        slot = match_slot,
        outcome = %outcome,
        graded = summary.graded,
        correct = summary.correct,
        "Match graded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;
    use crate::predict::schema::sample;

    fn issued(provider: &str, home: u32, draw: u32, away: u32) -> ProviderPrediction {
        ProviderPrediction {
            provider: provider.into(),
            prediction: sample(home, draw, away),
        }
    }

    #[tokio::test]
    async fn grading_updates_tracker_and_tables() {
        let pool = connect_memory().await.unwrap();
        let tracker = AccuracyTracker::new();
        save_predictions(
            &pool,
            "match:football:arsenal-chelsea",
            "Premier League",
            &[issued("a", 60, 20, 20), issued("b", 20, 20, 60), issued("c", 40, 20, 40)],
        )
        .await
        .unwrap();

        let summary = grade_match(&pool, &tracker, "match:football:arsenal-chelsea", 2, 1)
            .await
            .unwrap();
        assert_eq!(summary.outcome, Outcome::Home);
        assert_eq!((summary.graded, summary.correct), (3, 1));

        assert_eq!(tracker.get("a").unwrap().overall, Tally { correct: 1, total: 1 });
        assert_eq!(tracker.get("c").unwrap().overall, Tally { correct: 0, total: 1 });

        let reloaded = load_tracker(&pool).await.unwrap();
        assert_eq!(reloaded.snapshot(), tracker.snapshot());
    }

    #[tokio::test]
    async fn predictions_are_graded_once() {
        let pool = connect_memory().await.unwrap();
        let tracker = AccuracyTracker::new();
        let slot = "match:football:a-b";
        save_predictions(&pool, slot, "L", &[issued("a", 30, 40, 30)]).await.unwrap();

        let first = grade_match(&pool, &tracker, slot, 1, 1).await.unwrap();
        let second = grade_match(&pool, &tracker, slot, 1, 1).await.unwrap();
        assert_eq!((first.graded, first.correct), (1, 1));
        assert_eq!(second.graded, 0);
        assert_eq!(tracker.get("a").unwrap().per_league["L"], Tally { correct: 1, total: 1 });
    }

    #[tokio::test]
    async fn counters_accumulate_across_matches() {
        let pool = connect_memory().await.unwrap();
        let tracker = AccuracyTracker::new();
        save_predictions(&pool, "m1", "L", &[issued("a", 60, 20, 20)]).await.unwrap();
        save_predictions(&pool, "m2", "L", &[issued("a", 60, 20, 20)]).await.unwrap();
        grade_match(&pool, &tracker, "m1", 3, 0).await.unwrap();
        grade_match(&pool, &tracker, "m2", 0, 1).await.unwrap();

        let reloaded = load_tracker(&pool).await.unwrap();
        assert_eq!(reloaded.get("a").unwrap().overall, Tally { correct: 1, total: 2 });
        assert_eq!(reloaded.weight("a", "L"), 0.5);
    }
}
