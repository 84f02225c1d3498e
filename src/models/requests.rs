use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to record a swipe for the authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SwipeRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "target_user_id", rename = "targetUserId")]
    pub target_user_id: String,
    #[validate(length(min = 1))]
    pub action: String,
    /// Client-chosen key that makes a retried swipe safe to replay
    #[validate(length(min = 1, max = 128))]
    #[serde(alias = "request_id", rename = "requestId", default)]
    pub request_id: Option<String>,
}
