pub mod extractor;
pub mod fuzzy;
pub mod layout;
pub mod parse;
pub mod search;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Lineup, MatchQuery, RecentResults, Sides, TeamStanding, UnavailablePlayer};

pub use extractor::SiteExtractor;
pub use layout::SiteLayout;

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Site root without a trailing slash.
    pub base_url: String,
    pub max_scroll_attempts: u32,
    /// Consecutive unchanged scroll heights that end the search.
    pub max_stale_scrolls: u32,
    pub scroll_delay: Duration,
    pub recent_results_limit: usize,
}

/// Everything the site contributes to a match record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteFacts {
    pub match_id: String,
    pub league: String,
    pub venue: String,
    pub unavailable_players: Sides<Vec<UnavailablePlayer>>,
    pub recent_results: RecentResults,
    pub lineups: Sides<Lineup>,
    pub standings: Sides<TeamStanding>,
}

/// Source of per-match site facts. The aggregator only sees this seam.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn extract(&self, query: &MatchQuery) -> Result<SiteFacts>;
}
