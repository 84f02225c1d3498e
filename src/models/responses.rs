use serde::{Deserialize, Serialize};
use crate::models::domain::MatchRecord;

/// Response for the swipe endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(rename = "windowStart")]
    pub window_start: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
    pub matched: bool,
    #[serde(rename = "matchId")]
    pub match_id: Option<String>,
}

/// Current quota as seen by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    #[serde(rename = "windowStart")]
    pub window_start: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "resetsAt")]
    pub resets_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
}

/// List of the user's matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchesResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub matches: Vec<MatchRecord>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
