use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use lume_swipe::config::{AuthProvider, Settings, StoreBackend};
use lume_swipe::core::{CoreContext, MatchDetector, QuotaTracker};
use lume_swipe::routes::{self, AppState};
use lume_swipe::services::{
    AppwriteClient, CacheManager, IdentityProvider, JwtIdentity, MemoryStore, PostgresStore, RedisStore,
};
use std::sync::Arc;
use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn startup_error(what: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", what, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, err))
}

async fn build_context(settings: &Settings) -> std::io::Result<CoreContext> {
    let ctx = match settings.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; quota and matches are lost on restart");
            CoreContext::single(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let db = settings
                .database
                .as_ref()
                .ok_or_else(|| startup_error("Configuration error", "database section is required for postgres"))?;
            let store = PostgresStore::from_settings(
                &db.url,
                db.max_connections,
                db.min_connections,
                db.acquire_timeout_secs,
                db.idle_timeout_secs,
            )
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;
            info!("PostgreSQL store initialized (max: {} connections)", db.max_connections.unwrap_or(10));
            CoreContext::single(Arc::new(store))
        }
        StoreBackend::Redis => {
            let redis = settings
                .redis
                .as_ref()
                .ok_or_else(|| startup_error("Configuration error", "redis section is required for redis store"))?;
            let store = RedisStore::new(&redis.url)
                .await
                .map_err(|e| startup_error("Failed to connect to Redis", e))?;
            info!("Redis store initialized");
            CoreContext::single(Arc::new(store))
        }
    };

    Ok(ctx
        .with_retry(settings.retry.policy())
        .with_window(settings.quota.window()))
}

fn build_identity(settings: &Settings) -> std::io::Result<Arc<dyn IdentityProvider>> {
    match settings.auth.provider {
        AuthProvider::Appwrite => {
            let appwrite = settings
                .appwrite
                .as_ref()
                .ok_or_else(|| startup_error("Configuration error", "appwrite section is required"))?;
            let client = AppwriteClient::new(appwrite.endpoint.clone(), appwrite.project_id.clone())
                .map_err(|e| startup_error("Failed to create Appwrite client", e))?;
            info!("Appwrite identity provider initialized");
            Ok(Arc::new(client))
        }
        AuthProvider::Jwt => {
            let secret = settings
                .auth
                .jwt_secret
                .as_deref()
                .ok_or_else(|| startup_error("Configuration error", "auth.jwt_secret is required"))?;
            info!("JWT identity provider initialized");
            Ok(Arc::new(JwtIdentity::new(secret)))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)))
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting Lume Swipe service...");

    let settings = Settings::load().map_err(|e| startup_error("Failed to load configuration", e))?;

    info!("Configuration loaded successfully");

    let ctx = build_context(&settings).await?;
    let identity = build_identity(&settings)?;

    // Match-list cache, Redis tier when configured
    let redis_url = settings.redis.as_ref().map(|r| r.url.as_str());
    let cache = match CacheManager::new(redis_url, settings.cache.l1_cache_size, settings.cache.ttl_secs).await {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to connect cache to Redis ({}), using in-memory cache only", e);
            CacheManager::local(settings.cache.l1_cache_size, settings.cache.ttl_secs)
        }
    };
    info!(
        "Cache manager initialized (L1: {} entries, TTL: {}s)",
        settings.cache.l1_cache_size, settings.cache.ttl_secs
    );

    let app_state = AppState {
        quota: QuotaTracker::new(&ctx),
        detector: MatchDetector::new(&ctx),
        identity,
        cache: Arc::new(cache),
        clock: ctx.clock.clone(),
        daily_limit: settings.quota.daily_limit,
    };

    info!(
        "Quota: {} swipes per {}s window, {} CAS attempts",
        settings.quota.daily_limit, settings.quota.window_secs, ctx.retry.max_attempts
    );

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
