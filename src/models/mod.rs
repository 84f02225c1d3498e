// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{UserStatus, AppliedKey, Versioned, LikeRecord, MatchRecord, ConsumeOutcome, MatchOutcome, SwipeAction, MAX_RECENT_KEYS};
pub use requests::SwipeRequest;
pub use responses::{SwipeResponse, QuotaResponse, MatchesResponse, HealthResponse, ErrorResponse};
