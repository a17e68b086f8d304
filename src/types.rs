use serde::{Deserialize, Serialize};

use crate::scrape::fuzzy::normalize_name;

// ---------------------------------------------------------------------------
// Match identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Football,
    Basketball,
}

impl Default for Sport {
    fn default() -> Self {
        Sport::Football
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "football" | "soccer" => Ok(Sport::Football),
            "basketball" => Ok(Sport::Basketball),
            other => Err(format!("unknown sport '{other}'")),
        }
    }
}

/// Normalized `home-away` identity of a fixture.
///
/// Whitespace, case and Latin diacritics are folded away so `" Fenerbahçe "`
/// and `"fenerbahce"` land in the same cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn new(home: &str, away: &str) -> Self {
        MatchKey(format!("{}-{}", normalize_name(home), normalize_name(away)))
    }

    /// Rebuild a key from its `home-away` text form, e.g. a URL path segment.
    /// Applies the same folding as `new`, so `"Fenerbahçe - Galatasaray"` and
    /// `"fenerbahce-galatasaray"` are the same key.
    pub fn from_raw(raw: &str) -> Self {
        let folded = normalize_name(raw);
        let parts: Vec<&str> = folded.split('-').map(str::trim).collect();
        MatchKey(parts.join("-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage slot in the cache: the same fixture in two sports never collides.
    pub fn cache_slot(&self, sport: Sport) -> String {
        format!("match:{sport}:{}", self.0)
    }
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a caller asks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchQuery {
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub sport: Sport,
}

impl MatchQuery {
    pub fn new(home_team: &str, away_team: &str, sport: Sport) -> Self {
        Self {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            sport,
        }
    }

    pub fn key(&self) -> MatchKey {
        MatchKey::new(&self.home_team, &self.away_team)
    }
}

// ---------------------------------------------------------------------------
// Merged record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailablePlayer {
    pub name: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupPlayer {
    pub number: Option<u32>,
    pub name: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineup {
    /// Formation label as shown by the site, e.g. `4-2-3-1`. Empty if not published.
    pub formation: String,
    pub players: Vec<LineupPlayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub position: u32,
    pub team: String,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    /// Scored:conceded exactly as displayed, e.g. `45:20`.
    pub score: String,
    pub points: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
    pub overall: Option<TableRow>,
    pub home: Option<TableRow>,
    pub away: Option<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    /// Degrees Celsius.
    pub temperature: f64,
    pub condition: String,
    /// Relative humidity, percent.
    pub humidity: f64,
    pub wind_speed: f64,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            temperature: 20.0,
            condition: "Unknown".to_string(),
            humidity: 50.0,
            wind_speed: 5.0,
        }
    }
}

/// Per-side pair used throughout the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sides<T> {
    pub home: T,
    pub away: T,
}

/// Formatted result strings, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentResults {
    pub home: Vec<String>,
    pub away: Vec<String>,
    pub between: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub home_team: String,
    pub away_team: String,
    pub sport: Sport,
    pub league: String,
    pub venue: String,
    pub unavailable_players: Sides<Vec<UnavailablePlayer>>,
    pub recent_results: RecentResults,
    pub lineups: Sides<Lineup>,
    pub standings: Sides<TeamStanding>,
    pub weather: WeatherSnapshot,
    /// Unix seconds at which the record was built.
    pub fetched_at: i64,
}

impl MatchRecord {
    pub fn key(&self) -> MatchKey {
        MatchKey::new(&self.home_team, &self.away_team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_key_is_stable_under_case_and_whitespace() {
        let a = MatchKey::new("  Fenerbahce ", "Galatasaray");
        let b = MatchKey::new("FENERBAHCE", "  galatasaray  ");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "fenerbahce-galatasaray");
    }

    #[test]
    fn match_key_folds_diacritics_and_inner_spaces() {
        let a = MatchKey::new("Fenerbahçe", "Beşiktaş   JK");
        assert_eq!(a.as_str(), "fenerbahce-besiktas jk");
    }

    #[test]
    fn raw_key_folds_like_new() {
        assert_eq!(
            MatchKey::from_raw("Fenerbahçe-Galatasaray"),
            MatchKey::new("Fenerbahçe", "Galatasaray")
        );
        assert_eq!(
            MatchKey::from_raw(" Beşiktaş   JK - Trabzonspor "),
            MatchKey::new("Besiktas JK", "Trabzonspor")
        );
        assert_eq!(
            MatchKey::from_raw("paris saint-germain-lyon"),
            MatchKey::new("Paris Saint-Germain", "Lyon")
        );
    }

    #[test]
    fn cache_slot_includes_sport() {
        let key = MatchKey::new("Lakers", "Celtics");
        assert_eq!(key.cache_slot(Sport::Basketball), "match:basketball:lakers-celtics");
    }

    #[test]
    fn default_weather_matches_documented_fallback() {
        let w = WeatherSnapshot::default();
        assert_eq!(w.temperature, 20.0);
        assert_eq!(w.condition, "Unknown");
        assert_eq!(w.humidity, 50.0);
        assert_eq!(w.wind_speed, 5.0);
    }

    #[test]
    fn sport_parses_aliases() {
        assert_eq!("Soccer".parse::<Sport>(), Ok(Sport::Football));
        assert!("curling".parse::<Sport>().is_err());
    }
}
