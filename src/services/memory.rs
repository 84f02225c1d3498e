use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::{LikeRecord, MatchRecord, UserStatus, Versioned};
use crate::services::store::{CasOutcome, InsertOutcome, LikeStore, StatusStore, StoreError};

#[derive(Default)]
struct Tables {
    statuses: HashMap<String, Versioned<UserStatus>>,
    likes: HashMap<(String, String), LikeRecord>,
    matches: HashMap<String, MatchRecord>,
    user_matches: HashMap<String, HashSet<String>>,
}

/// In-process store for tests and single-node development.
///
/// Every operation takes the table lock once, so each call is atomic with
/// respect to the others. The lock is never held across an await.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Number of stored directed likes
    pub fn like_count(&self) -> usize {
        self.lock().map(|t| t.likes.len()).unwrap_or(0)
    }

    /// Number of stored matches
    pub fn match_count(&self) -> usize {
        self.lock().map(|t| t.matches.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn load_status(&self, user_id: &str) -> Result<Option<Versioned<UserStatus>>, StoreError> {
        Ok(self.lock()?.statuses.get(user_id).cloned())
    }

    async fn compare_and_swap_status(
        &self,
        user_id: &str,
        expected: Option<u64>,
        status: &UserStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut tables = self.lock()?;
        let current = tables.statuses.get(user_id).map(|v| v.version);

        if current != expected {
            return Ok(CasOutcome::Conflict);
        }

        let version = expected.map_or(1, |v| v + 1);
        tables.statuses.insert(
            user_id.to_string(),
            Versioned {
                version,
                value: status.clone(),
            },
        );
        Ok(CasOutcome::Applied(version))
    }
}

#[async_trait]
impl LikeStore for MemoryStore {
    async fn insert_like(&self, like: &LikeRecord) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.lock()?;
        let key = (like.liker.clone(), like.liked.clone());
        if tables.likes.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        tables.likes.insert(key, like.clone());
        Ok(InsertOutcome::Created)
    }

    async fn like_exists(&self, liker: &str, liked: &str) -> Result<bool, StoreError> {
        let tables = self.lock()?;
        Ok(tables.likes.contains_key(&(liker.to_string(), liked.to_string())))
    }

    async fn insert_match(&self, record: &MatchRecord) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.lock()?;
        if tables.matches.contains_key(&record.match_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        tables.matches.insert(record.match_id.clone(), record.clone());
        for user in [&record.user_a, &record.user_b] {
            tables
                .user_matches
                .entry(user.clone())
                .or_default()
                .insert(record.match_id.clone());
        }
        Ok(InsertOutcome::Created)
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.lock()?.matches.get(match_id).cloned())
    }

    async fn list_matches(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let tables = self.lock()?;
        let mut records: Vec<MatchRecord> = tables
            .user_matches
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.matches.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.match_id.cmp(&b.match_id)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_cas_rejects_stale_version() {
        let store = MemoryStore::new();
        let status = UserStatus::fresh(Utc::now());

        assert_eq!(
            store.compare_and_swap_status("u1", None, &status).await.unwrap(),
            CasOutcome::Applied(1)
        );
        // A second creator lost the race
        assert_eq!(
            store.compare_and_swap_status("u1", None, &status).await.unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(
            store.compare_and_swap_status("u1", Some(1), &status).await.unwrap(),
            CasOutcome::Applied(2)
        );
        assert_eq!(
            store.compare_and_swap_status("u1", Some(1), &status).await.unwrap(),
            CasOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn test_insert_like_is_create_if_absent() {
        let store = MemoryStore::new();
        let like = LikeRecord {
            liker: "a".to_string(),
            liked: "b".to_string(),
            created_at: Utc::now(),
        };

        assert_eq!(store.insert_like(&like).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert_like(&like).await.unwrap(), InsertOutcome::AlreadyExists);
        assert!(store.like_exists("a", "b").await.unwrap());
        assert!(!store.like_exists("b", "a").await.unwrap());
        assert_eq!(store.like_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_match_keeps_first_record() {
        let store = MemoryStore::new();
        let first = MatchRecord {
            match_id: "m1".to_string(),
            user_a: "a".to_string(),
            user_b: "b".to_string(),
            created_at: Utc::now(),
        };
        let mut second = first.clone();
        second.created_at = first.created_at + chrono::Duration::seconds(5);

        assert_eq!(store.insert_match(&first).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert_match(&second).await.unwrap(), InsertOutcome::AlreadyExists);
        assert_eq!(store.get_match("m1").await.unwrap(), Some(first.clone()));
        assert_eq!(store.list_matches("b").await.unwrap(), vec![first]);
        assert!(store.list_matches("c").await.unwrap().is_empty());
    }
}
