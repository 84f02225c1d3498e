use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::context::CoreContext;
use crate::core::error::{require_user, SwipeError};
use crate::core::retry::RetryPolicy;
use crate::models::{LikeRecord, MatchOutcome, MatchRecord};
use crate::services::{InsertOutcome, LikeStore};

/// Namespace for match ids derived from user pairs
const MATCH_NAMESPACE: Uuid = Uuid::from_u128(0x6c75_6d65_2d73_7769_7065_2d6d_6174_6368);

/// Canonical, order-independent id of the match between `a` and `b`.
///
/// The sorted pair is length-prefixed before hashing so that ids containing
/// separator characters can never collide with another pair.
pub fn match_id_for(a: &str, b: &str) -> String {
    let (lo, hi) = sorted_pair(a, b);
    let canonical = format!("{}:{}{}", lo.len(), lo, hi);
    Uuid::new_v5(&MATCH_NAMESPACE, canonical.as_bytes()).to_string()
}

#[inline]
fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Turns directed likes into mutual matches
///
/// # Steps
/// 1. Insert the like edge if absent
/// 2. Look up the reverse edge by key
/// 3. On a hit, create the match record if absent
///
/// Every step is idempotent, so a retried or concurrent `evaluate` from
/// either side converges on the same single match record.
#[derive(Clone)]
pub struct MatchDetector {
    likes: Arc<dyn LikeStore>,
    retry: RetryPolicy,
}

impl MatchDetector {
    pub fn new(ctx: &CoreContext) -> Self {
        Self {
            likes: ctx.likes.clone(),
            retry: ctx.retry,
        }
    }

    /// Record `liker -> liked` and report whether it completes a match
    pub async fn evaluate(
        &self,
        liker: &str,
        liked: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, SwipeError> {
        require_user(liker)?;
        if liked.trim().is_empty() {
            return Err(SwipeError::InvalidInput("empty target user id".to_string()));
        }
        if liker == liked {
            return Err(SwipeError::InvalidInput("users cannot like themselves".to_string()));
        }

        let likes = &self.likes;

        // Step 1: directed edge
        let like = LikeRecord {
            liker: liker.to_string(),
            liked: liked.to_string(),
            created_at: now,
        };
        let like_ref = &like;
        let inserted = self
            .retry
            .run("insert_like", move || likes.insert_like(like_ref))
            .await?;
        if inserted == InsertOutcome::AlreadyExists {
            tracing::debug!("Like {} -> {} already recorded", liker, liked);
        }

        // Step 2: reverse edge, point lookup
        let reciprocated = self
            .retry
            .run("like_exists", move || likes.like_exists(liked, liker))
            .await?;
        if !reciprocated {
            return Ok(MatchOutcome::no_match());
        }

        // Step 3: create-if-absent match
        let (user_a, user_b) = sorted_pair(liker, liked);
        let record = MatchRecord {
            match_id: match_id_for(liker, liked),
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            created_at: now,
        };
        let record_ref = &record;
        let created = self
            .retry
            .run("insert_match", move || likes.insert_match(record_ref))
            .await?;

        match created {
            InsertOutcome::Created => {
                tracing::info!("New match {} between {} and {}", record.match_id, user_a, user_b);
            }
            InsertOutcome::AlreadyExists => {
                tracing::debug!("Match {} already exists", record.match_id);
            }
        }

        Ok(MatchOutcome::matched(record.match_id))
    }

    /// Matches the user takes part in, oldest first
    pub async fn matches_for(&self, user_id: &str) -> Result<Vec<MatchRecord>, SwipeError> {
        require_user(user_id)?;

        let likes = &self.likes;
        let records = self
            .retry
            .run("list_matches", move || likes.list_matches(user_id))
            .await?;
        Ok(records)
    }

    /// Stored match between two users, if any
    pub async fn find_match(&self, a: &str, b: &str) -> Result<Option<MatchRecord>, SwipeError> {
        let match_id = match_id_for(a, b);
        let likes = &self.likes;
        let id = match_id.as_str();
        let record = self
            .retry
            .run("get_match", move || likes.get_match(id))
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;

    fn detector() -> (MatchDetector, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = CoreContext::single(store.clone()).with_retry(RetryPolicy::immediate(3));
        (MatchDetector::new(&ctx), store)
    }

    #[test]
    fn test_match_id_is_order_independent() {
        assert_eq!(match_id_for("alice", "bob"), match_id_for("bob", "alice"));
        assert_ne!(match_id_for("alice", "bob"), match_id_for("alice", "carol"));
    }

    #[test]
    fn test_match_id_has_no_separator_collisions() {
        assert_ne!(match_id_for("a_b", "c"), match_id_for("a", "b_c"));
        assert_ne!(match_id_for("ab", "c"), match_id_for("a", "bc"));
    }

    #[tokio::test]
    async fn test_one_sided_like_does_not_match() {
        let (detector, store) = detector();
        let outcome = detector.evaluate("a", "b", Utc::now()).await.unwrap();
        assert_eq!(outcome, MatchOutcome::no_match());
        assert_eq!(store.match_count(), 0);
    }

    #[tokio::test]
    async fn test_self_like_rejected() {
        let (detector, store) = detector();
        let result = detector.evaluate("a", "a", Utc::now()).await;
        assert!(matches!(result, Err(SwipeError::InvalidInput(_))));
        assert_eq!(store.like_count(), 0);
    }

    #[tokio::test]
    async fn test_match_keeps_first_created_at() {
        let (detector, _) = detector();
        let t = Utc::now();

        detector.evaluate("a", "b", t).await.unwrap();
        detector.evaluate("b", "a", t + chrono::Duration::seconds(1)).await.unwrap();
        detector.evaluate("b", "a", t + chrono::Duration::seconds(9)).await.unwrap();

        let record = detector.find_match("a", "b").await.unwrap().unwrap();
        assert_eq!(record.created_at, t + chrono::Duration::seconds(1));
        assert_eq!(record.user_a, "a");
        assert_eq!(record.user_b, "b");
    }
}
