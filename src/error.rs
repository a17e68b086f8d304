use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Listing search exhausted without a row matching the requested pair.
    #[error("Match not found: {home} vs {away}")]
    MatchNotFound { home: String, away: String },

    /// Navigation finished with a status outside 2xx/304, or never committed.
    #[error("Page load error for {url}: {reason}")]
    PageLoadError { url: String, reason: String },

    /// Redirected to a challenge page that did not clear within the grace wait.
    #[error("Anti-bot challenge did not resolve at {url}")]
    AntiBotBlocked { url: String },

    #[error("Scraping failed for '{label}' after {attempts} attempt(s): {source}")]
    ScrapingFailed {
        label: String,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("No provider returned a schema-valid prediction ({attempted} attempted)")]
    AllPredictionsInvalid { attempted: usize },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Provider '{provider}' error: {reason}")]
    Provider { provider: String, reason: String },

    #[error("Invalid prediction: {0}")]
    InvalidPrediction(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether a fresh browser session could plausibly make the operation succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::MatchNotFound { .. }
                | AppError::Config(_)
                | AppError::BadRequest(_)
                | AppError::ScrapingFailed { .. }
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::MatchNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ScrapingFailed { .. }
            | AppError::AntiBotBlocked { .. }
            | AppError::AllPredictionsInvalid { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_not_found_is_terminal() {
        let err = AppError::MatchNotFound {
            home: "a".into(),
            away: "b".into(),
        };
        assert!(!err.is_retryable());
        assert!(AppError::Timeout("goto".into()).is_retryable());
        assert!(AppError::AntiBotBlocked { url: "x".into() }.is_retryable());
    }

    #[test]
    fn hard_errors_map_to_gateway_statuses() {
        let resp = AppError::AllPredictionsInvalid { attempted: 3 }.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let resp = AppError::MatchNotFound {
            home: "a".into(),
            away: "b".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
