/// Row types for the tables in `migrations/0001_init.sql`.

#[derive(Debug, sqlx::FromRow)]
pub struct CacheRow {
    pub payload: Vec<u8>,
    pub expires_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ProviderAccuracyRow {
    pub provider: String,
    pub correct: i64,
    pub total: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct LeagueAccuracyRow {
    pub provider: String,
    pub league: String,
    pub correct: i64,
    pub total: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: i64,
    pub league: String,
    pub provider: String,
    pub payload: String,
}
