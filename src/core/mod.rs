// Core quota and match logic
pub mod clock;
pub mod context;
pub mod detector;
pub mod error;
pub mod quota;
pub mod retry;
pub mod window;

pub use clock::{Clock, SystemClock, ManualClock};
pub use context::CoreContext;
pub use detector::{MatchDetector, match_id_for};
pub use error::SwipeError;
pub use quota::QuotaTracker;
pub use retry::RetryPolicy;
pub use window::{QuotaView, Decision, decide, view, window_expired, default_window};
