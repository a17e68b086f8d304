use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::{LEAGUE_MIN_OUTCOMES, LEAGUE_WEIGHT_MULTIPLIER, NEUTRAL_WEIGHT};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub correct: u64,
    pub total: u64,
}

impl Tally {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyRecord {
    pub overall: Tally,
    pub per_league: HashMap<String, Tally>,
}

/// Per-provider graded outcome counters. Counters only grow.
#[derive(Default)]
pub struct AccuracyTracker {
    records: DashMap<String, AccuracyRecord>,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, provider: &str, league: &str, correct: bool) {
        let mut record = self.records.entry(provider.to_string()).or_default();
        record.overall.record(correct);
        record
            .per_league
            .entry(league.to_string())
            .or_default()
            .record(correct);
    }

    /// Seed counters loaded from storage.
    pub fn load_overall(&self, provider: &str, tally: Tally) {
        self.records.entry(provider.to_string()).or_default().overall = tally;
    }

    pub fn load_league(&self, provider: &str, league: &str, tally: Tally) {
        self.records
            .entry(provider.to_string())
            .or_default()
            .per_league
            .insert(league.to_string(), tally);
    }

    /// Ranking weight for a provider's prediction in `league`.
    ///
    /// A league ratio backed by enough outcomes is doubled; otherwise the overall
    /// ratio applies, and a provider with no history gets the neutral weight.
    pub fn weight(&self, provider: &str, league: &str) -> f64 {
        let Some(record) = self.records.get(provider) else {
            return NEUTRAL_WEIGHT;
        };
        if let Some(tally) = record.per_league.get(league) {
            if tally.total >= LEAGUE_MIN_OUTCOMES {
                if let Some(ratio) = tally.ratio() {
                    return ratio * LEAGUE_WEIGHT_MULTIPLIER;
                }
            }
        }
        record.overall.ratio().unwrap_or(NEUTRAL_WEIGHT)
    }

    pub fn get(&self, provider: &str) -> Option<AccuracyRecord> {
        self.records.get(provider).map(|r| r.clone())
    }

    pub fn snapshot(&self) -> BTreeMap<String, AccuracyRecord> {
        self.records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
