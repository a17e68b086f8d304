//! Pure HTML → typed facts. No browser, no I/O.
//!
//! A selector that fails to compile yields empty output rather than an error:
//! missing data degrades, it never aborts a build.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::scrape::fuzzy::{best_match, names_match};
use crate::scrape::layout::SiteLayout;
use crate::types::{
    Lineup, LineupPlayer, RecentResults, Sides, TableRow, UnavailablePlayer,
};

fn sel(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(selector, "Invalid selector: {e}");
            None
        }
    }
}

/// Collapsed text content of an element.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn child_text(el: ElementRef<'_>, selector: &Option<Selector>) -> Option<String> {
    let selector = selector.as_ref()?;
    el.select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingMatch {
    pub match_id: String,
    pub league: String,
    pub home: String,
    pub away: String,
}

/// Scan the listing for a row whose home and away names both fuzzy-match.
/// The league is taken from the closest header above the row.
pub fn find_listing_match(
    html: &str,
    layout: &SiteLayout,
    home: &str,
    away: &str,
) -> Option<ListingMatch> {
    let doc = Html::parse_document(html);
    let combined = sel(&format!("{}, {}", layout.listing_header, layout.listing_row))?;
    let header = sel(layout.listing_header)?;
    let league_name = sel(layout.listing_league_name);
    let home_sel = sel(layout.listing_home);
    let away_sel = sel(layout.listing_away);

    let mut league = String::new();
    for el in doc.select(&combined) {
        if header.matches(&el) {
            league = child_text(el, &league_name).unwrap_or_else(|| text_of(el));
            continue;
        }

        let (Some(row_home), Some(row_away)) = (child_text(el, &home_sel), child_text(el, &away_sel))
        else {
            continue;
        };
        if !(names_match(home, &row_home) && names_match(away, &row_away)) {
            continue;
        }

        let Some(raw_id) = el.value().attr("id") else {
            continue;
        };
        let match_id = raw_id
            .strip_prefix(layout.row_id_prefix)
            .unwrap_or(raw_id)
            .to_string();
        return Some(ListingMatch {
            match_id,
            league: league.clone(),
            home: row_home,
            away: row_away,
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn parse_venue(html: &str, layout: &SiteLayout) -> Option<String> {
    let doc = Html::parse_document(html);
    let item = sel(layout.info_item)?;
    let label = sel(layout.info_label);
    let value = sel(layout.info_value);

    doc.select(&item).find_map(|el| {
        let name = child_text(el, &label)?.to_lowercase();
        if name.contains("venue") || name.contains("stadium") {
            child_text(el, &value)
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// Lineups
// ---------------------------------------------------------------------------

/// The first two `side` blocks inside `section`: home, then away.
fn sides<'a>(doc: &'a Html, section: &str, side: &str) -> Vec<ElementRef<'a>> {
    let (Some(section), Some(side)) = (sel(section), sel(side)) else {
        return Vec::new();
    };
    match doc.select(&section).next() {
        Some(root) => root.select(&side).take(2).collect(),
        None => Vec::new(),
    }
}

pub fn parse_lineups(html: &str, layout: &SiteLayout) -> Sides<Lineup> {
    let doc = Html::parse_document(html);
    let formation = sel(layout.formation);
    let player = sel(layout.player);
    let number = sel(layout.player_number);
    let name = sel(layout.player_name);
    let position = sel(layout.player_position);

    let formations: Vec<String> = match (sel(layout.lineup_section), &formation) {
        (Some(section), Some(formation)) => doc
            .select(&section)
            .next()
            .map(|root| root.select(formation).map(text_of).take(2).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let mut lineups: Vec<Lineup> = sides(&doc, layout.lineup_section, layout.side)
        .into_iter()
        .enumerate()
        .map(|(i, side)| {
            let players = match &player {
                Some(player) => side
                    .select(player)
                    .map(|p| LineupPlayer {
                        number: child_text(p, &number).and_then(|n| n.parse().ok()),
                        name: child_text(p, &name),
                        position: child_text(p, &position),
                    })
                    .collect(),
                None => Vec::new(),
            };
            Lineup {
                formation: formations.get(i).cloned().unwrap_or_default(),
                players,
            }
        })
        .collect();

    lineups.resize_with(2, Lineup::default);
    let away = lineups.pop().unwrap_or_default();
    let home = lineups.pop().unwrap_or_default();
    Sides { home, away }
}

pub fn parse_unavailable(html: &str, layout: &SiteLayout) -> Sides<Vec<UnavailablePlayer>> {
    let doc = Html::parse_document(html);
    let player = sel(layout.player);
    let name = sel(layout.player_name);
    let reason = sel(layout.player_reason);

    let mut per_side: Vec<Vec<UnavailablePlayer>> = sides(&doc, layout.missing_section, layout.side)
        .into_iter()
        .map(|side| match &player {
            Some(player) => side
                .select(player)
                .filter_map(|p| {
                    Some(UnavailablePlayer {
                        name: child_text(p, &name)?,
                        reason: child_text(p, &reason),
                    })
                })
                .collect(),
            None => Vec::new(),
        })
        .collect();

    per_side.resize_with(2, Vec::new);
    let away = per_side.pop().unwrap_or_default();
    let home = per_side.pop().unwrap_or_default();
    Sides { home, away }
}

// ---------------------------------------------------------------------------
// Head-to-head
// ---------------------------------------------------------------------------

/// `"12.03.24 Fenerbahce 2-1 Galatasaray"`. Rows keep the site's order (most recent first).
fn format_result(row: ElementRef<'_>, layout: &H2hSelectors) -> Option<String> {
    let home = child_text(row, &layout.home)?;
    let away = child_text(row, &layout.away)?;
    let score = layout
        .result
        .as_ref()
        .and_then(|s| row.select(s).next())
        .map(|r| {
            r.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("-")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "?-?".to_string());
    let line = match child_text(row, &layout.date) {
        Some(date) => format!("{date} {home} {score} {away}"),
        None => format!("{home} {score} {away}"),
    };
    Some(line)
}

struct H2hSelectors {
    row: Option<Selector>,
    date: Option<Selector>,
    home: Option<Selector>,
    away: Option<Selector>,
    result: Option<Selector>,
}

/// Sections in page order: home team's last matches, away team's, then mutual.
pub fn parse_recent_results(html: &str, layout: &SiteLayout, limit: usize) -> RecentResults {
    let doc = Html::parse_document(html);
    let selectors = H2hSelectors {
        row: sel(layout.h2h_row),
        date: sel(layout.h2h_date),
        home: sel(layout.h2h_home),
        away: sel(layout.h2h_away),
        result: sel(layout.h2h_result),
    };
    let (Some(section), Some(row)) = (sel(layout.h2h_section), selectors.row.as_ref()) else {
        return RecentResults::default();
    };

    let mut lists: Vec<Vec<String>> = doc
        .select(&section)
        .take(3)
        .map(|s| {
            s.select(row)
                .filter_map(|r| format_result(r, &selectors))
                .take(limit)
                .collect()
        })
        .collect();

    lists.resize_with(3, Vec::new);
    let between = lists.pop().unwrap_or_default();
    let away = lists.pop().unwrap_or_default();
    let home = lists.pop().unwrap_or_default();
    RecentResults { home, away, between }
}

// ---------------------------------------------------------------------------
// Standings
// ---------------------------------------------------------------------------

fn number_at(values: &[String], idx: usize) -> u32 {
    values
        .get(idx)
        .and_then(|v| v.trim_end_matches('.').parse().ok())
        .unwrap_or(0)
}

pub fn parse_standings(html: &str, layout: &SiteLayout) -> Vec<TableRow> {
    let doc = Html::parse_document(html);
    let (Some(row), Some(value)) = (sel(layout.table_row), sel(layout.table_value)) else {
        return Vec::new();
    };
    let rank = sel(layout.table_rank);
    let team = sel(layout.table_team);
    let cols = layout.columns;

    doc.select(&row)
        .filter_map(|r| {
            let team = child_text(r, &team)?;
            let values: Vec<String> = r.select(&value).map(text_of).collect();
            if values.is_empty() {
                return None;
            }
            let points = match cols.points {
                Some(idx) => number_at(&values, idx),
                None => number_at(&values, values.len() - 1),
            };
            Some(TableRow {
                position: child_text(r, &rank)
                    .and_then(|p| p.trim_end_matches('.').parse().ok())
                    .unwrap_or(0),
                team,
                played: number_at(&values, cols.played),
                won: number_at(&values, cols.won),
                drawn: cols.drawn.map(|i| number_at(&values, i)).unwrap_or(0),
                lost: number_at(&values, cols.lost),
                score: values.get(cols.score).cloned().unwrap_or_default(),
                points,
            })
        })
        .collect()
}

/// Row for `team` by LCS similarity; ties keep the first-listed row.
pub fn pick_standing(rows: &[TableRow], team: &str) -> Option<TableRow> {
    let (idx, _) = best_match(team, rows.iter().map(|r| r.team.as_str()))?;
    rows.get(idx).cloned()
}
