//! Where things live on the scraped site.
//!
//! Selectors and URL shapes are content, not logic: swapping the site means
//! swapping this table.

use crate::types::Sport;

/// Column positions of the value cells in a standings row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandingsColumns {
    pub played: usize,
    pub won: usize,
    /// None for sports without draws.
    pub drawn: Option<usize>,
    pub lost: usize,
    pub score: usize,
    /// Points are read from the last value cell when None.
    pub points: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SiteLayout {
    // listing
    pub listing_row: &'static str,
    pub listing_header: &'static str,
    pub listing_league_name: &'static str,
    pub listing_home: &'static str,
    pub listing_away: &'static str,
    /// Prefix stripped from a row's `id` attribute to get the match id.
    pub row_id_prefix: &'static str,

    // summary
    pub info_item: &'static str,
    pub info_label: &'static str,
    pub info_value: &'static str,

    // lineups
    pub lineup_section: &'static str,
    pub missing_section: &'static str,
    pub formation: &'static str,
    pub side: &'static str,
    pub player: &'static str,
    pub player_number: &'static str,
    pub player_name: &'static str,
    pub player_position: &'static str,
    pub player_reason: &'static str,

    // head-to-head
    pub h2h_section: &'static str,
    pub h2h_row: &'static str,
    pub h2h_date: &'static str,
    pub h2h_home: &'static str,
    pub h2h_away: &'static str,
    pub h2h_result: &'static str,

    // standings
    pub table_row: &'static str,
    pub table_rank: &'static str,
    pub table_team: &'static str,
    pub table_value: &'static str,
    pub columns: StandingsColumns,
}

impl SiteLayout {
    pub fn for_sport(sport: Sport) -> Self {
        match sport {
            Sport::Football => Self::football(),
            Sport::Basketball => Self::basketball(),
        }
    }

    pub fn football() -> Self {
        Self {
            listing_row: ".event__match",
            listing_header: ".event__header",
            listing_league_name: ".event__title--name",
            listing_home: ".event__participant--home",
            listing_away: ".event__participant--away",
            row_id_prefix: "g_1_",

            info_item: ".mi__item",
            info_label: ".mi__item__name",
            info_value: ".mi__item__val",

            lineup_section: ".lf__lineUp",
            missing_section: ".lf__missing",
            formation: ".lf__formation",
            side: ".lf__side",
            player: ".lf__participant",
            player_number: ".lf__number",
            player_name: ".lf__name",
            player_position: ".lf__position",
            player_reason: ".lf__reason",

            h2h_section: ".h2h__section",
            h2h_row: ".h2h__row",
            h2h_date: ".h2h__date",
            h2h_home: ".h2h__homeParticipant",
            h2h_away: ".h2h__awayParticipant",
            h2h_result: ".h2h__result",

            table_row: ".ui-table__row",
            table_rank: ".table__cell--rank",
            table_team: ".tableCellParticipant__name",
            table_value: ".table__cell--value",
            // MP W D L G GD PTS
            columns: StandingsColumns {
                played: 0,
                won: 1,
                drawn: Some(2),
                lost: 3,
                score: 4,
                points: None,
            },
        }
    }

    pub fn basketball() -> Self {
        Self {
            row_id_prefix: "g_3_",
            // MP W L PTS-diff PCT
            columns: StandingsColumns {
                played: 0,
                won: 1,
                drawn: None,
                lost: 2,
                score: 3,
                points: None,
            },
            ..Self::football()
        }
    }

    pub fn listing_url(base: &str, sport: Sport) -> String {
        format!("{base}/{sport}/")
    }

    pub fn summary_url(base: &str, match_id: &str) -> String {
        format!("{base}/match/{match_id}/#/match-summary/match-summary")
    }

    pub fn lineups_url(base: &str, match_id: &str) -> String {
        format!("{base}/match/{match_id}/#/match-summary/lineups")
    }

    pub fn h2h_url(base: &str, match_id: &str) -> String {
        format!("{base}/match/{match_id}/#/h2h/overall")
    }

    /// `view` is `overall`, `home` or `away`.
    pub fn standings_url(base: &str, match_id: &str, view: &str) -> String {
        format!("{base}/match/{match_id}/#/standings/table/{view}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_site_shape() {
        let base = "https://www.flashscore.com";
        assert_eq!(
            SiteLayout::listing_url(base, Sport::Basketball),
            "https://www.flashscore.com/basketball/"
        );
        assert_eq!(
            SiteLayout::standings_url(base, "AbC123", "home"),
            "https://www.flashscore.com/match/AbC123/#/standings/table/home"
        );
    }

    #[test]
    fn basketball_has_no_draw_column() {
        let layout = SiteLayout::for_sport(Sport::Basketball);
        assert!(layout.columns.drawn.is_none());
        assert_eq!(layout.row_id_prefix, "g_3_");
        assert_eq!(layout.listing_row, SiteLayout::football().listing_row);
    }
}
