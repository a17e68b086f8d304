use tracing::{debug, info};

use crate::browser::BrowserSession;
use crate::error::{AppError, Result};
use crate::scrape::layout::SiteLayout;
use crate::scrape::parse::{find_listing_match, ListingMatch};
use crate::scrape::ExtractorSettings;
use crate::types::MatchQuery;

/// Scroll the sport's listing until a row matches both teams.
///
/// Ends with `MatchNotFound` after `max_scroll_attempts` scans or once the
/// scroll height has stayed put for `max_stale_scrolls` consecutive scrolls.
pub async fn find_match(
    session: &BrowserSession,
    layout: &SiteLayout,
    settings: &ExtractorSettings,
    query: &MatchQuery,
) -> Result<ListingMatch> {
    let url = SiteLayout::listing_url(&settings.base_url, query.sport);
    session.goto(&url).await?;
    match session.wait_for(layout.listing_row).await {
        Ok(()) | Err(AppError::Timeout(_)) => {}
        Err(e) => return Err(e),
    }

    let mut last_height = session.scroll_height().await?;
    let mut stale = 0u32;

    // The first loaded page is always scanned.
    for scan in 1..=settings.max_scroll_attempts.max(1) {
        let html = session.html().await?;
        if let Some(found) = find_listing_match(&html, layout, &query.home_team, &query.away_team) {
            info!(
                home = %query.home_team,
                away = %query.away_team,
                match_id = %found.match_id,
                league = %found.league,
                scan,
                "Match located"
            );
            return Ok(found);
        }

        session.scroll_by_viewport().await?;
        tokio::time::sleep(settings.scroll_delay).await;

        let height = session.scroll_height().await?;
        if height == last_height {
            stale += 1;
            debug!(scan, stale, height, "Scroll height unchanged");
            if stale >= settings.max_stale_scrolls {
                break;
            }
        } else {
            stale = 0;
            last_height = height;
        }
    }

    Err(AppError::MatchNotFound {
        home: query.home_team.clone(),
        away: query.away_team.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::browser::fake::{test_session_settings, FakeSite};
    use crate::browser::SessionManager;
    use crate::limiter::{HostRateLimiter, RateLimit};
    use crate::types::Sport;

    const LISTING_URL: &str = "https://site.test/football/";

    fn settings() -> ExtractorSettings {
        ExtractorSettings {
            base_url: "https://site.test".to_string(),
            max_scroll_attempts: 30,
            max_stale_scrolls: 3,
            scroll_delay: Duration::from_millis(750),
            recent_results_limit: 5,
        }
    }

    fn row(id: &str, home: &str, away: &str) -> String {
        format!(
            r#"<div id="g_1_{id}" class="event__match"><div class="event__participant--home">{home}</div><div class="event__participant--away">{away}</div></div>"#
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body><div class="event__header"><span class="event__title--name">Super Lig</span></div>{}</body></html>"#,
            rows.concat()
        )
    }

    async fn session(site: &Arc<FakeSite>) -> Arc<BrowserSession> {
        SessionManager::new(
            site.driver(),
            HostRateLimiter::new(RateLimit::new(100, Duration::from_secs(1))),
            None,
            test_session_settings(),
        )
        .create()
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn missing_match_ends_after_stale_scrolls() {
        let site = FakeSite::new();
        site.route(
            LISTING_URL,
            &page(&[row("A1", "Besiktas", "Trabzonspor"), row("A2", "Arsenal", "Chelsea")]),
        );
        let session = session(&site).await;
        let query = MatchQuery::new("Fenerbahce", "Galatasaray", Sport::Football);

        let started = tokio::time::Instant::now();
        let err = find_match(&session, &SiteLayout::football(), &settings(), &query)
            .await
            .unwrap_err();

        match err {
            AppError::MatchNotFound { home, away } => {
                assert_eq!(home, "Fenerbahce");
                assert_eq!(away, "Galatasaray");
            }
            other => panic!("expected MatchNotFound, got {other:?}"),
        }
        assert_eq!(site.scrolls(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(3 * 750));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn match_found_after_lazy_loading() {
        let site = FakeSite::new();
        let first = vec![row("A1", "Besiktas", "Trabzonspor")];
        let mut second = first.clone();
        second.push(row("ZZ99", "Fenerbahçe", "Galatasaray"));
        site.route_stages(LISTING_URL, vec![page(&first), page(&second)]);

        let session = session(&site).await;
        let query = MatchQuery::new("fenerbahce", "galatasaray", Sport::Football);
        let found = find_match(&session, &SiteLayout::football(), &settings(), &query)
            .await
            .unwrap();
        assert_eq!(found.match_id, "ZZ99");
        assert_eq!(found.league, "Super Lig");
        assert_eq!(site.scrolls(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scan_cap_bounds_a_growing_listing() {
        let site = FakeSite::new();
        let stages = (0..50)
            .map(|i| page(&vec![row("X", "Arsenal", "Chelsea"); i + 1]))
            .collect();
        site.route_stages(LISTING_URL, stages);

        let session = session(&site).await;
        let mut settings = settings();
        settings.max_scroll_attempts = 4;
        let query = MatchQuery::new("Fenerbahce", "Galatasaray", Sport::Football);
        let err = find_match(&session, &SiteLayout::football(), &settings, &query)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MatchNotFound { .. }));
        assert_eq!(site.scrolls(), 4);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_scan_budget_still_reads_the_first_page() {
        let site = FakeSite::new();
        site.route(LISTING_URL, &page(&[row("FG1", "Fenerbahce", "Galatasaray")]));

        let session = session(&site).await;
        let mut settings = settings();
        settings.max_scroll_attempts = 0;
        let query = MatchQuery::new("Fenerbahce", "Galatasaray", Sport::Football);
        let found = find_match(&session, &SiteLayout::football(), &settings, &query)
            .await
            .unwrap();
        assert_eq!(found.match_id, "FG1");
        assert_eq!(site.scrolls(), 0);
        session.close().await;
    }
}
