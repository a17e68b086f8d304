use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_score(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::Home,
            std::cmp::Ordering::Less => Outcome::Away,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        };
        write!(f, "{s}")
    }
}

/// A provider's answer after validation.
///
/// Every percentage is bounded to `[0, 100]` and the win triple must sum to
/// exactly 100. Nothing is renormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub over_percentage: f64,
    pub both_teams_score_percentage: f64,
    pub half_time_winner: Outcome,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Float noise tolerated on the win-triple sum.
const SUM_TOLERANCE: f64 = 1e-6;

impl Prediction {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("homeWin", self.home_win),
            ("draw", self.draw),
            ("awayWin", self.away_win),
            ("overPercentage", self.over_percentage),
            ("bothTeamsScorePercentage", self.both_teams_score_percentage),
            ("confidence", self.confidence),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(AppError::InvalidPrediction(format!(
                    "{field} = {value} is outside [0, 100]"
                )));
            }
        }
        let sum = self.home_win + self.draw + self.away_win;
        if (sum - 100.0).abs() > SUM_TOLERANCE {
            return Err(AppError::InvalidPrediction(format!(
                "homeWin + draw + awayWin = {sum}, expected 100"
            )));
        }
        Ok(())
    }

    /// Argmax of the win triple. Any tie for the top counts as a draw.
    pub fn likely_outcome(&self) -> Outcome {
        let top = self.home_win.max(self.draw).max(self.away_win);
        let leaders = [self.home_win, self.draw, self.away_win]
            .iter()
            .filter(|&&p| p == top)
            .count();
        if leaders > 1 || self.draw == top {
            Outcome::Draw
        } else if self.home_win == top {
            Outcome::Home
        } else {
            Outcome::Away
        }
    }
}

/// Drop a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_prediction(raw: &str) -> Result<Prediction> {
    let prediction: Prediction = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| AppError::InvalidPrediction(e.to_string()))?;
    prediction.validate()?;
    Ok(prediction)
}

#[cfg(test)]
pub(crate) fn sample(home: u32, draw: u32, away: u32) -> Prediction {
    Prediction {
        home_win: f64::from(home),
        draw: f64::from(draw),
        away_win: f64::from(away),
        over_percentage: 55.0,
        both_teams_score_percentage: 48.0,
        half_time_winner: Outcome::Draw,
        confidence: 62.0,
        predicted_score: Some("2-1".into()),
        reasoning: None,
    }
}
