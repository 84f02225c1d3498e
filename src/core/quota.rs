use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::context::CoreContext;
use crate::core::error::{require_user, SwipeError};
use crate::core::retry::RetryPolicy;
use crate::core::window::{decide, view, QuotaView};
use crate::models::{ConsumeOutcome, UserStatus};
use crate::services::{CasOutcome, StatusStore, StoreError};

/// Gates and accounts for the per-user daily swipe budget
///
/// Every mutation is an optimistic read-decide-write over the user's single
/// status record: the decision is recomputed from a fresh snapshot on each
/// attempt and committed with compare-and-swap, so two callers racing for
/// the last swipe can never both win.
#[derive(Clone)]
pub struct QuotaTracker {
    statuses: Arc<dyn StatusStore>,
    retry: RetryPolicy,
    window: chrono::Duration,
}

/// One pass of a CAS loop
enum Attempt<T> {
    Done(T),
    Conflict,
}

impl QuotaTracker {
    pub fn new(ctx: &CoreContext) -> Self {
        Self {
            statuses: ctx.statuses.clone(),
            retry: ctx.retry,
            window: ctx.window,
        }
    }

    /// Try to spend one swipe from the user's quota
    pub async fn try_consume(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, SwipeError> {
        self.consume(user_id, limit, now, None).await
    }

    /// Like `try_consume`, but a retry carrying an already applied `key`
    /// returns the recorded outcome instead of charging again
    pub async fn try_consume_idempotent(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
        key: &str,
    ) -> Result<ConsumeOutcome, SwipeError> {
        if key.trim().is_empty() {
            return Err(SwipeError::InvalidInput("empty idempotency key".to_string()));
        }
        self.consume(user_id, limit, now, Some(key)).await
    }

    /// Switch the user to unlimited swipes and start a fresh window
    ///
    /// Upgrading an already premium user leaves the stored status untouched.
    pub async fn upgrade_to_premium(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStatus, SwipeError> {
        require_user(user_id)?;

        let status = self
            .cas_loop("upgrade_to_premium", user_id, |current| {
                if let Some(status) = current.filter(|s| s.is_premium) {
                    return (status.clone(), None);
                }
                let upgraded = UserStatus {
                    swipe_count: 0,
                    window_start: now,
                    is_premium: true,
                    recent_keys: Vec::new(),
                };
                (upgraded.clone(), Some(upgraded))
            })
            .await?;

        tracing::info!("User {} upgraded to premium", user_id);
        Ok(status)
    }

    /// Quota as the next consume would see it; never writes
    pub async fn status(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaView, SwipeError> {
        require_user(user_id)?;

        let statuses = &self.statuses;
        let current = self
            .retry
            .run("load_status", move || statuses.load_status(user_id))
            .await?;

        let snapshot = current.map_or_else(|| UserStatus::fresh(now), |v| v.value);
        Ok(view(&snapshot, limit, now, self.window))
    }

    async fn consume(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
        key: Option<&str>,
    ) -> Result<ConsumeOutcome, SwipeError> {
        require_user(user_id)?;

        let window = self.window;
        let outcome = self
            .cas_loop("try_consume", user_id, |current| {
                let fresh;
                let snapshot = match current {
                    Some(status) => status,
                    None => {
                        fresh = UserStatus::fresh(now);
                        &fresh
                    }
                };
                let decision = decide(snapshot, limit, now, window, key);
                (decision.outcome, decision.write)
            })
            .await?;

        tracing::debug!(
            "Consume for {}: allowed={}, remaining={}",
            user_id,
            outcome.allowed,
            outcome.remaining
        );
        Ok(outcome)
    }

    /// Optimistic read-decide-write over one status record.
    ///
    /// `step` sees the stored status (or `None`) and returns the result to
    /// hand back plus the status to write, if any. A conflicting write or a
    /// store failure re-runs the whole cycle on a new snapshot.
    async fn cas_loop<T, F>(&self, operation: &str, user_id: &str, mut step: F) -> Result<T, SwipeError>
    where
        F: FnMut(Option<&UserStatus>) -> (T, Option<UserStatus>),
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_failure = String::from("write conflict");

        for attempt in 1..=attempts {
            match self.cas_once(user_id, &mut step).await {
                Ok(Attempt::Done(result)) => return Ok(result),
                Ok(Attempt::Conflict) => {
                    tracing::debug!(
                        "{} conflict for {} (attempt {}/{})",
                        operation,
                        user_id,
                        attempt,
                        attempts
                    );
                    last_failure = String::from("write conflict");
                }
                Err(e) => {
                    tracing::warn!(
                        "{} store failure for {} (attempt {}/{}): {}",
                        operation,
                        user_id,
                        attempt,
                        attempts,
                        e
                    );
                    last_failure = e.to_string();
                }
            }

            if attempt < attempts {
                self.retry.pause(attempt).await;
            }
        }

        tracing::error!("{} for {} gave up after {} attempts", operation, user_id, attempts);
        Err(SwipeError::TransientStore(format!(
            "{} gave up after {} attempts: {}",
            operation, attempts, last_failure
        )))
    }

    async fn cas_once<T, F>(&self, user_id: &str, step: &mut F) -> Result<Attempt<T>, StoreError>
    where
        F: FnMut(Option<&UserStatus>) -> (T, Option<UserStatus>),
    {
        let current = self.statuses.load_status(user_id).await?;
        let expected = current.as_ref().map(|v| v.version);
        let (result, write) = step(current.as_ref().map(|v| &v.value));

        let Some(next) = write else {
            return Ok(Attempt::Done(result));
        };

        match self.statuses.compare_and_swap_status(user_id, expected, &next).await? {
            CasOutcome::Applied(_) => Ok(Attempt::Done(result)),
            CasOutcome::Conflict => Ok(Attempt::Conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock};
    use crate::services::MemoryStore;

    fn tracker() -> (QuotaTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = CoreContext::single(store.clone()).with_retry(RetryPolicy::immediate(3));
        (QuotaTracker::new(&ctx), store)
    }

    #[tokio::test]
    async fn test_first_consume_creates_status() {
        let (tracker, store) = tracker();
        let now = Utc::now();

        let outcome = tracker.try_consume("u1", 3, now).await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.remaining, 2);
        assert_eq!(outcome.window_start, now);

        let stored = store.load_status("u1").await.unwrap().unwrap();
        assert_eq!(stored.value.swipe_count, 1);
    }

    #[tokio::test]
    async fn test_refused_consume_leaves_store_untouched() {
        let (tracker, store) = tracker();
        let now = Utc::now();

        let outcome = tracker.try_consume("u1", 0, now).await.unwrap();
        assert!(!outcome.allowed);
        assert!(store.load_status("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upgrade_is_idempotent() {
        let (tracker, store) = tracker();
        let clock = ManualClock::new(Utc::now());

        tracker.try_consume("u1", 5, clock.now()).await.unwrap();
        let first = tracker.upgrade_to_premium("u1", clock.now()).await.unwrap();
        let version = store.load_status("u1").await.unwrap().unwrap().version;

        clock.advance(chrono::Duration::hours(1));
        let second = tracker.upgrade_to_premium("u1", clock.now()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.load_status("u1").await.unwrap().unwrap().version, version);
    }

    #[tokio::test]
    async fn test_blank_user_rejected() {
        let (tracker, _) = tracker();
        let result = tracker.try_consume("", 5, Utc::now()).await;
        assert!(matches!(result, Err(SwipeError::NotAuthenticated(_))));
    }
}
