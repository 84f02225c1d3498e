use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most recent idempotency keys remembered per user within one window
pub const MAX_RECENT_KEYS: usize = 32;

/// Per-user swipe quota state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    #[serde(rename = "swipeCount")]
    pub swipe_count: u32,
    #[serde(rename = "windowStart")]
    pub window_start: DateTime<Utc>,
    #[serde(rename = "isPremium", default)]
    pub is_premium: bool,
    #[serde(rename = "recentKeys", default)]
    pub recent_keys: Vec<AppliedKey>,
}

impl UserStatus {
    /// Status of a user who has never swiped
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            swipe_count: 0,
            window_start: now,
            is_premium: false,
            recent_keys: Vec::new(),
        }
    }

    /// Look up a consume that was already applied under `key`
    pub fn applied_key(&self, key: &str) -> Option<&AppliedKey> {
        self.recent_keys.iter().find(|k| k.key == key)
    }

    /// Remember an applied key, dropping the oldest past the bound
    pub fn remember_key(&mut self, key: &str, remaining: u32) {
        self.recent_keys.push(AppliedKey {
            key: key.to_string(),
            remaining,
        });
        if self.recent_keys.len() > MAX_RECENT_KEYS {
            let excess = self.recent_keys.len() - MAX_RECENT_KEYS;
            self.recent_keys.drain(..excess);
        }
    }
}

/// Idempotency key of a consume already charged in the current window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedKey {
    pub key: String,
    pub remaining: u32,
}

/// A stored value together with its compare-and-swap token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// One directed like edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub liker: String,
    pub liked: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Mutual match between two users, `user_a` sorts before `user_b`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "matchId")]
    pub match_id: String,
    #[serde(rename = "userA")]
    pub user_a: String,
    #[serde(rename = "userB")]
    pub user_b: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    /// The participant that is not `user_id`
    pub fn partner_of(&self, user_id: &str) -> &str {
        if self.user_a == user_id {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

/// Result of a quota consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeOutcome {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(rename = "windowStart")]
    pub window_start: DateTime<Utc>,
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
}

/// Result of evaluating a directed like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matched: bool,
    #[serde(rename = "matchId")]
    pub match_id: Option<String>,
}

impl MatchOutcome {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            match_id: None,
        }
    }

    pub fn matched(match_id: String) -> Self {
        Self {
            matched: true,
            match_id: Some(match_id),
        }
    }
}

/// Swipe direction chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Pass,
}

impl std::str::FromStr for SwipeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(SwipeAction::Like),
            "pass" => Ok(SwipeAction::Pass),
            other => Err(format!("unknown swipe action: {}", other)),
        }
    }
}
