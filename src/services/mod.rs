// Service exports
pub mod appwrite;
pub mod cache;
pub mod identity;
pub mod memory;
pub mod postgres;
pub mod redis_store;
pub mod store;

pub use appwrite::{AppwriteClient, AppwriteError};
pub use cache::{CacheManager, CacheKey, CacheError, CacheStats};
pub use identity::{AuthError, IdentityProvider, JwtIdentity, SessionClaims, bearer_token};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use redis_store::{RedisStore, RedisKey};
pub use store::{StatusStore, LikeStore, StoreError, CasOutcome, InsertOutcome};
