//! Lume Swipe - swipe quota and match detection service for Lume dating app
//!
//! This library provides the consistency core behind swiping: a per-user
//! daily quota enforced with compare-and-swap, and mutual-like detection
//! that creates each match exactly once.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use self::core::{CoreContext, QuotaTracker, MatchDetector, SwipeError, match_id_for};
pub use models::{UserStatus, LikeRecord, MatchRecord, ConsumeOutcome, MatchOutcome};
