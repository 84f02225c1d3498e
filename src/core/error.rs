use thiserror::Error;

use crate::services::StoreError;

/// Errors surfaced by the quota and match core.
///
/// Running out of quota is not an error; it is reported as
/// `ConsumeOutcome { allowed: false, .. }`.
#[derive(Debug, Error)]
pub enum SwipeError {
    /// Missing or invalid user identity, re-authenticate before retrying
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// Persistence failed or stayed contended after all retries
    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SwipeError {
    /// Whether the caller may retry the same call unchanged
    pub fn is_retriable(&self) -> bool {
        matches!(self, SwipeError::TransientStore(_))
    }
}

impl From<StoreError> for SwipeError {
    fn from(value: StoreError) -> Self {
        SwipeError::TransientStore(value.to_string())
    }
}

/// Reject blank user ids at the component boundary
pub(crate) fn require_user(user_id: &str) -> Result<(), SwipeError> {
    if user_id.trim().is_empty() {
        return Err(SwipeError::NotAuthenticated("empty user id".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_become_transient() {
        let err: SwipeError = StoreError::Unavailable("down".to_string()).into();
        assert!(err.is_retriable());
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_require_user() {
        assert!(require_user("u1").is_ok());
        assert!(matches!(require_user("  "), Err(SwipeError::NotAuthenticated(_))));
    }
}
