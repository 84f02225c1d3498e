use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{LikeRecord, MatchRecord, UserStatus, Versioned};
use crate::services::store::{CasOutcome, InsertOutcome, LikeStore, StatusStore, StoreError};

/// Sets KEYS[1] to ARGV[2] only when the stored document's version equals
/// ARGV[1]; an expected version of -1 means "no document yet".
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local expected = tonumber(ARGV[1])
if current then
  local stored = cjson.decode(current)
  if tonumber(stored['version']) ~= expected then
    return 0
  end
elseif expected ~= -1 then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// Redis-backed store
///
/// Status documents are JSON `{version, value}` pairs updated through a Lua
/// compare-and-swap script. Likes and matches use `SET NX`; each user also
/// has a set indexing the matches they take part in.
pub struct RedisStore {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    cas: redis::Script,
}

#[derive(Serialize, Deserialize)]
struct StoredStatus {
    version: u64,
    value: UserStatus,
}

/// Key builder. Ids are url-encoded so `:` inside an id cannot forge a key.
pub struct RedisKey;

impl RedisKey {
    pub fn status(user_id: &str) -> String {
        format!("swipe:status:{}", urlencoding::encode(user_id))
    }

    pub fn like(liker: &str, liked: &str) -> String {
        format!(
            "swipe:like:{}:{}",
            urlencoding::encode(liker),
            urlencoding::encode(liked)
        )
    }

    pub fn match_record(match_id: &str) -> String {
        format!("swipe:match:{}", urlencoding::encode(match_id))
    }

    pub fn user_matches(user_id: &str) -> String {
        format!("swipe:user_matches:{}", urlencoding::encode(user_id))
    }
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            cas: redis::Script::new(CAS_SCRIPT),
        })
    }

    async fn set_nx(&self, key: &str, json: String) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.redis.lock().await;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("NX")
            .query_async(&mut *conn)
            .await?;

        Ok(match reply {
            Some(_) => InsertOutcome::Created,
            None => InsertOutcome::AlreadyExists,
        })
    }
}

#[async_trait]
impl StatusStore for RedisStore {
    async fn load_status(&self, user_id: &str) -> Result<Option<Versioned<UserStatus>>, StoreError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(RedisKey::status(user_id))
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        match value {
            Some(json) => {
                let stored: StoredStatus = serde_json::from_str(&json)?;
                Ok(Some(Versioned {
                    version: stored.version,
                    value: stored.value,
                }))
            }
            None => Ok(None),
        }
    }

    async fn compare_and_swap_status(
        &self,
        user_id: &str,
        expected: Option<u64>,
        status: &UserStatus,
    ) -> Result<CasOutcome, StoreError> {
        let version = expected.map_or(1, |v| v + 1);
        let json = serde_json::to_string(&StoredStatus {
            version,
            value: status.clone(),
        })?;
        let expected_arg: i64 = expected.map_or(-1, |v| v as i64);

        let mut conn = self.redis.lock().await;
        let applied: i64 = self
            .cas
            .key(RedisKey::status(user_id))
            .arg(expected_arg)
            .arg(json)
            .invoke_async(&mut *conn)
            .await?;
        drop(conn);

        if applied == 1 {
            Ok(CasOutcome::Applied(version))
        } else {
            tracing::debug!("Status CAS conflict for user {} at version {:?}", user_id, expected);
            Ok(CasOutcome::Conflict)
        }
    }
}

#[async_trait]
impl LikeStore for RedisStore {
    async fn insert_like(&self, like: &LikeRecord) -> Result<InsertOutcome, StoreError> {
        let json = serde_json::to_string(like)?;
        self.set_nx(&RedisKey::like(&like.liker, &like.liked), json).await
    }

    async fn like_exists(&self, liker: &str, liked: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.lock().await;
        let count: i64 = redis::cmd("EXISTS")
            .arg(RedisKey::like(liker, liked))
            .query_async(&mut *conn)
            .await?;
        Ok(count > 0)
    }

    async fn insert_match(&self, record: &MatchRecord) -> Result<InsertOutcome, StoreError> {
        let json = serde_json::to_string(record)?;
        let outcome = self.set_nx(&RedisKey::match_record(&record.match_id), json).await?;

        // Index both participants even when the record already existed, so a
        // replay after a partial failure repairs the index.
        let mut conn = self.redis.lock().await;
        for user in [&record.user_a, &record.user_b] {
            let _: i64 = redis::cmd("SADD")
                .arg(RedisKey::user_matches(user))
                .arg(&record.match_id)
                .query_async(&mut *conn)
                .await?;
        }

        Ok(outcome)
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(RedisKey::match_record(match_id))
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        value
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn list_matches(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let mut conn = self.redis.lock().await;
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(RedisKey::user_matches(user_id))
            .query_async(&mut *conn)
            .await?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| RedisKey::match_record(id)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        let mut records = values
            .into_iter()
            .flatten()
            .map(|json| serde_json::from_str::<MatchRecord>(&json))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.match_id.cmp(&b.match_id)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_redis_key_builder() {
        assert_eq!(RedisKey::status("user123"), "swipe:status:user123");
        assert_eq!(RedisKey::like("a", "b"), "swipe:like:a:b");
        assert_eq!(RedisKey::user_matches("user123"), "swipe:user_matches:user123");
    }

    #[test]
    fn test_redis_keys_escape_separators() {
        // "a:b" -> "c" and "a" -> "b:c" must not share a key
        assert_ne!(RedisKey::like("a:b", "c"), RedisKey::like("a", "b:c"));
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_cas_and_set_nx() {
        let store = RedisStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        let user = format!("redis-test-{}", uuid::Uuid::new_v4());
        let status = UserStatus::fresh(Utc::now());

        assert_eq!(
            store.compare_and_swap_status(&user, None, &status).await.unwrap(),
            CasOutcome::Applied(1)
        );
        assert_eq!(
            store.compare_and_swap_status(&user, None, &status).await.unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(
            store.compare_and_swap_status(&user, Some(1), &status).await.unwrap(),
            CasOutcome::Applied(2)
        );

        let like = LikeRecord {
            liker: user.clone(),
            liked: "other".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(store.insert_like(&like).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert_like(&like).await.unwrap(), InsertOutcome::AlreadyExists);
        assert!(store.like_exists(&user, "other").await.unwrap());
    }
}
