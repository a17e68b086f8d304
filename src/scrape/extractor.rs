use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::browser::{BrowserSession, RetryExecutor};
use crate::error::{AppError, Result};
use crate::scrape::layout::SiteLayout;
use crate::scrape::parse::{
    parse_lineups, parse_recent_results, parse_standings, parse_unavailable, parse_venue,
    pick_standing, ListingMatch,
};
use crate::scrape::search::find_match;
use crate::scrape::{ExtractorSettings, MatchSource, SiteFacts};
use crate::types::{
    Lineup, MatchQuery, RecentResults, Sides, Sport, TeamStanding, UnavailablePlayer,
};

/// Wait for `selector`; a timeout means the section is simply not on the page.
async fn section_present(session: &BrowserSession, selector: &str) -> Result<bool> {
    match session.wait_for(selector).await {
        Ok(()) => Ok(true),
        Err(AppError::Timeout(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn or_default<T: Default>(label: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        warn!(label, error = %e, "Sub-extraction failed, using defaults");
        T::default()
    })
}

/// Site facts for one fixture: search first, then five independent sub-steps
/// run concurrently. Each sub-step has its own retry budget and session, and
/// degrades to defaults on failure. Only the search can fail the extraction.
pub struct SiteExtractor {
    retry: Arc<RetryExecutor>,
    settings: ExtractorSettings,
}

impl SiteExtractor {
    pub fn new(retry: Arc<RetryExecutor>, settings: ExtractorSettings) -> Arc<Self> {
        Arc::new(Self { retry, settings })
    }

    async fn search(&self, layout: &SiteLayout, query: &MatchQuery) -> Result<ListingMatch> {
        self.retry
            .run("search", |session| async move {
                find_match(&session, layout, &self.settings, query).await
            })
            .await
    }

    /// Summary page venue. Only an anti-bot block is worth a fresh session;
    /// any other failure leaves the venue empty.
    async fn venue(&self, layout: &SiteLayout, match_id: &str) -> Result<String> {
        self.retry
            .run("venue", |session| async move {
                match self.read_venue(&session, layout, match_id).await {
                    Ok(venue) => Ok(venue),
                    Err(e @ AppError::AntiBotBlocked { .. }) => Err(e),
                    Err(e) => {
                        warn!(match_id, error = %e, "Venue unavailable");
                        Ok(String::new())
                    }
                }
            })
            .await
    }

    /// Missing players block of the lineups page.
    async fn unavailable(
        &self,
        layout: &SiteLayout,
        match_id: &str,
    ) -> Result<Sides<Vec<UnavailablePlayer>>> {
        let url = SiteLayout::lineups_url(&self.settings.base_url, match_id);
        self.retry
            .run("unavailable", |session| {
                let url = url.clone();
                async move {
                    session.goto(&url).await?;
                    if !section_present(&session, layout.missing_section).await? {
                        return Ok(Sides::default());
                    }
                    Ok::<_, AppError>(parse_unavailable(&session.html().await?, layout))
                }
            })
            .await
    }

    async fn read_venue(&self, session: &BrowserSession, layout: &SiteLayout, match_id: &str) -> Result<String> {
        session
            .goto(&SiteLayout::summary_url(&self.settings.base_url, match_id))
            .await?;
        if !section_present(session, layout.info_item).await? {
            return Ok(String::new());
        }
        Ok(parse_venue(&session.html().await?, layout).unwrap_or_default())
    }

    async fn recent_results(&self, layout: &SiteLayout, match_id: &str) -> Result<RecentResults> {
        let url = SiteLayout::h2h_url(&self.settings.base_url, match_id);
        let limit = self.settings.recent_results_limit;
        self.retry
            .run("h2h", |session| {
                let url = url.clone();
                async move {
                    session.goto(&url).await?;
                    if !section_present(&session, layout.h2h_section).await? {
                        return Ok(RecentResults::default());
                    }
                    Ok::<_, AppError>(parse_recent_results(&session.html().await?, layout, limit))
                }
            })
            .await
    }

    async fn lineups(&self, layout: &SiteLayout, match_id: &str, sport: Sport) -> Result<Sides<Lineup>> {
        // The basketball vertical publishes no lineups.
        if sport == Sport::Basketball {
            return Ok(Sides::default());
        }
        let url = SiteLayout::lineups_url(&self.settings.base_url, match_id);
        self.retry
            .run("lineups", |session| {
                let url = url.clone();
                async move {
                    session.goto(&url).await?;
                    if !section_present(&session, layout.lineup_section).await? {
                        return Ok(Sides::default());
                    }
                    Ok::<_, AppError>(parse_lineups(&session.html().await?, layout))
                }
            })
            .await
    }

    /// Overall, home and away tables, each resolved to the two teams' rows.
    async fn standings(
        &self,
        layout: &SiteLayout,
        match_id: &str,
        query: &MatchQuery,
    ) -> Result<Sides<TeamStanding>> {
        let base = &self.settings.base_url;
        self.retry
            .run("standings", |session| async move {
                let mut standings = Sides::<TeamStanding>::default();
                for view in ["overall", "home", "away"] {
                    session
                        .goto(&SiteLayout::standings_url(base, match_id, view))
                        .await?;
                    let rows = if section_present(&session, layout.table_row).await? {
                        parse_standings(&session.html().await?, layout)
                    } else {
                        Vec::new()
                    };
                    let home = pick_standing(&rows, &query.home_team);
                    let away = pick_standing(&rows, &query.away_team);
                    match view {
                        "overall" => (standings.home.overall, standings.away.overall) = (home, away),
                        "home" => (standings.home.home, standings.away.home) = (home, away),
                        _ => (standings.home.away, standings.away.away) = (home, away),
                    }
                }
                Ok::<_, AppError>(standings)
            })
            .await
    }
}

#[async_trait]
impl MatchSource for SiteExtractor {
    async fn extract(&self, query: &MatchQuery) -> Result<SiteFacts> {
        let layout = SiteLayout::for_sport(query.sport);
        let found = self.search(&layout, query).await?;
        let id = found.match_id.as_str();

        let (venue, unavailable_players, recent_results, lineups, standings) = tokio::join!(
            self.venue(&layout, id),
            self.unavailable(&layout, id),
            self.recent_results(&layout, id),
            self.lineups(&layout, id, query.sport),
            self.standings(&layout, id, query),
        );

        let facts = SiteFacts {
            match_id: found.match_id.clone(),
            league: found.league,
            venue: or_default("venue", venue),
            unavailable_players: or_default("unavailable", unavailable_players),
            recent_results: or_default("h2h", recent_results),
            lineups: or_default("lineups", lineups),
            standings: or_default("standings", standings),
        };

        info!(
            home = %query.home_team,
            away = %query.away_team,
            match_id = %facts.match_id,
            venue = %facts.venue,
            "Site facts extracted"
        );
        Ok(facts)
    }
}
