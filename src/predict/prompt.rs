use std::fmt::Write;

use crate::types::{Lineup, MatchRecord, Sport, TableRow, UnavailablePlayer};

pub const SYSTEM_PROMPT: &str = "You are a sports analyst. Answer with a single JSON object and nothing else.";

const ANSWER_FORMAT: &str = r#"Respond with JSON of exactly this shape:
{"homeWin": number, "draw": number, "awayWin": number,
 "overPercentage": number, "bothTeamsScorePercentage": number,
 "halfTimeWinner": "home" | "draw" | "away", "confidence": number,
 "predictedScore": string, "reasoning": string}
homeWin + draw + awayWin must equal exactly 100. All percentages are between 0 and 100."#;

/// Render a merged record as a plain-text briefing followed by the answer format.
pub fn build_prompt(record: &MatchRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Match: {} vs {}", record.home_team, record.away_team);
    let _ = writeln!(out, "Sport: {}", record.sport);
    if !record.league.is_empty() {
        let _ = writeln!(out, "League: {}", record.league);
    }
    if !record.venue.is_empty() {
        let _ = writeln!(out, "Venue: {}", record.venue);
    }
    let w = &record.weather;
    let _ = writeln!(
        out,
        "Weather: {}, {:.1}°C, humidity {:.0}%, wind {:.1} km/h",
        w.condition, w.temperature, w.humidity, w.wind_speed
    );

    section(&mut out, &format!("Recent form {}", record.home_team), &record.recent_results.home);
    section(&mut out, &format!("Recent form {}", record.away_team), &record.recent_results.away);
    section(&mut out, "Head to head", &record.recent_results.between);

    for (team, standing) in [
        (&record.home_team, &record.standings.home),
        (&record.away_team, &record.standings.away),
    ] {
        let rows = [
            ("overall", &standing.overall),
            ("home", &standing.home),
            ("away", &standing.away),
        ];
        if rows.iter().all(|(_, r)| r.is_none()) {
            continue;
        }
        let _ = writeln!(out, "\nStandings {team}:");
        for (view, row) in rows {
            if let Some(row) = row {
                let _ = writeln!(out, "- {view}: {}", table_row(row, record.sport));
            }
        }
    }

    unavailable(&mut out, &record.home_team, &record.unavailable_players.home);
    unavailable(&mut out, &record.away_team, &record.unavailable_players.away);
    lineup(&mut out, &record.home_team, &record.lineups.home);
    lineup(&mut out, &record.away_team, &record.lineups.away);

    let _ = write!(out, "\n{ANSWER_FORMAT}");
    out
}

fn section(out: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}:");
    for line in lines {
        let _ = writeln!(out, "- {line}");
    }
}

fn table_row(row: &TableRow, sport: Sport) -> String {
    match sport {
        Sport::Football => format!(
            "#{} P{} W{} D{} L{} {} {}pts",
            row.position, row.played, row.won, row.drawn, row.lost, row.score, row.points
        ),
        Sport::Basketball => format!(
            "#{} P{} W{} L{} {}",
            row.position, row.played, row.won, row.lost, row.score
        ),
    }
}

fn unavailable(out: &mut String, team: &str, players: &[UnavailablePlayer]) {
    if players.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nUnavailable {team}:");
    for p in players {
        match &p.reason {
            Some(reason) => {
                let _ = writeln!(out, "- {} ({reason})", p.name);
            }
            None => {
                let _ = writeln!(out, "- {}", p.name);
            }
        }
    }
}

fn lineup(out: &mut String, team: &str, lineup: &Lineup) {
    if lineup.players.is_empty() {
        return;
    }
    let _ = write!(out, "\nLineup {team}");
    if !lineup.formation.is_empty() {
        let _ = write!(out, " ({})", lineup.formation);
    }
    let names: Vec<&str> = lineup
        .players
        .iter()
        .filter_map(|p| p.name.as_deref())
        .collect();
    let _ = writeln!(out, ": {}", names.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineupPlayer, RecentResults, Sides, TeamStanding, WeatherSnapshot};

    fn record() -> MatchRecord {
        MatchRecord {
            home_team: "Fenerbahce".into(),
            away_team: "Galatasaray".into(),
            sport: Sport::Football,
            league: "Super Lig".into(),
            venue: String::new(),
            unavailable_players: Sides {
                home: vec![UnavailablePlayer {
                    name: "Dzeko".into(),
                    reason: Some("Injury".into()),
                }],
                away: vec![],
            },
            recent_results: RecentResults {
                home: vec!["10.03. Fenerbahce 2-0 Kasimpasa".into()],
                away: vec![],
                between: vec!["01.11. Galatasaray 1-1 Fenerbahce".into()],
            },
            lineups: Sides {
                home: Lineup {
                    formation: "4-2-3-1".into(),
                    players: vec![LineupPlayer {
                        number: Some(1),
                        name: Some("Livakovic".into()),
                        position: None,
                    }],
                },
                away: Lineup::default(),
            },
            standings: Sides {
                home: TeamStanding {
                    overall: Some(TableRow {
                        position: 2,
                        team: "Fenerbahce".into(),
                        played: 26,
                        won: 20,
                        drawn: 4,
                        lost: 2,
                        score: "61:21".into(),
                        points: 64,
                    }),
                    ..TeamStanding::default()
                },
                away: TeamStanding::default(),
            },
            weather: WeatherSnapshot::default(),
            fetched_at: 0,
        }
    }

    #[test]
    fn prompt_mentions_available_facts_only() {
        let prompt = build_prompt(&record());
        assert!(prompt.starts_with("Match: Fenerbahce vs Galatasaray\n"));
        assert!(prompt.contains("League: Super Lig"));
        assert!(!prompt.contains("Venue:"));
        assert!(prompt.contains("- Dzeko (Injury)"));
        assert!(prompt.contains("Lineup Fenerbahce (4-2-3-1): Livakovic"));
        assert!(prompt.contains("- overall: #2 P26 W20 D4 L2 61:21 64pts"));
        assert!(!prompt.contains("Standings Galatasaray"));
        assert!(!prompt.contains("Recent form Galatasaray"));
        assert!(prompt.contains("must equal exactly 100"));
    }
}
