use actix_web::{web, HttpRequest, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::core::{Clock, MatchDetector, QuotaTracker, SwipeError};
use crate::models::{
    ErrorResponse, HealthResponse, MatchRecord, MatchesResponse, QuotaResponse, SwipeAction,
    SwipeRequest, SwipeResponse,
};
use crate::services::{bearer_token, AuthError, CacheKey, CacheManager, IdentityProvider};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub quota: QuotaTracker,
    pub detector: MatchDetector,
    pub identity: Arc<dyn IdentityProvider>,
    pub cache: Arc<CacheManager>,
    pub clock: Arc<dyn Clock>,
    pub daily_limit: u32,
}

/// Configure all swipe-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/swipes", web::post().to(swipe))
        .route("/quota", web::get().to(quota_status))
        .route("/premium/upgrade", web::post().to(upgrade_premium))
        .route("/matches", web::get().to(list_matches));
}

fn error_response(status: actix_web::http::StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

fn swipe_error_response(err: &SwipeError) -> HttpResponse {
    use actix_web::http::StatusCode;

    match err {
        SwipeError::NotAuthenticated(_) => {
            error_response(StatusCode::UNAUTHORIZED, "Not authenticated", err.to_string())
        }
        SwipeError::InvalidInput(_) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid input", err.to_string())
        }
        SwipeError::TransientStore(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Try again", err.to_string())
        }
    }
}

/// Resolve the caller's user id from the bearer token
async fn authenticate(state: &AppState, req: &HttpRequest) -> Result<String, HttpResponse> {
    use actix_web::http::StatusCode;

    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let resolved = match bearer_token(header) {
        Ok(token) => state.identity.resolve(token).await,
        Err(e) => Err(e),
    };

    resolved.map_err(|e| match e {
        AuthError::Unavailable(_) => {
            tracing::error!("Identity provider unavailable: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Identity provider unavailable", e.to_string())
        }
        _ => {
            tracing::info!("Rejected request on {}: {}", req.path(), e);
            error_response(StatusCode::UNAUTHORIZED, "Not authenticated", e.to_string())
        }
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    tracing::trace!("Health check, cache: {:?}", state.cache.stats());

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now(),
    })
}

/// Swipe endpoint
///
/// POST /api/v1/swipes
///
/// Request body:
/// ```json
/// {
///   "targetUserId": "string",
///   "action": "like|pass",
///   "requestId": "optional string"
/// }
/// ```
///
/// Spends one swipe from the caller's quota and, for likes, checks whether
/// the like completes a match. A refused swipe is not an error: the
/// response carries `allowed: false` so the client can offer an upgrade.
async fn swipe(
    state: web::Data<AppState>,
    req: web::Json<SwipeRequest>,
    http_req: HttpRequest,
) -> impl Responder {
    let user_id = match authenticate(&state, &http_req).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for swipe request: field_errors={:?}", errors);
        return error_response(
            actix_web::http::StatusCode::BAD_REQUEST,
            "Validation failed",
            errors.to_string(),
        );
    }

    let action = match req.action.parse::<SwipeAction>() {
        Ok(action) => action,
        Err(message) => {
            return error_response(actix_web::http::StatusCode::BAD_REQUEST, "Invalid action", message);
        }
    };

    if req.target_user_id == user_id {
        return swipe_error_response(&SwipeError::InvalidInput("users cannot swipe on themselves".to_string()));
    }

    // Server clock only, never a client-supplied timestamp
    let now = state.clock.now();

    let consumed = match &req.request_id {
        Some(key) => state.quota.try_consume_idempotent(&user_id, state.daily_limit, now, key).await,
        None => state.quota.try_consume(&user_id, state.daily_limit, now).await,
    };

    let outcome = match consumed {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Quota check failed for {}: {}", user_id, e);
            return swipe_error_response(&e);
        }
    };

    let mut response = SwipeResponse {
        allowed: outcome.allowed,
        remaining: outcome.remaining,
        window_start: outcome.window_start,
        is_premium: outcome.is_premium,
        matched: false,
        match_id: None,
    };

    if !outcome.allowed {
        tracing::info!("User {} is out of swipes until the window resets", user_id);
        return HttpResponse::Ok().json(response);
    }

    if action == SwipeAction::Like {
        match state.detector.evaluate(&user_id, &req.target_user_id, now).await {
            Ok(result) => {
                if result.matched {
                    invalidate_matches(&state.cache, &[user_id.as_str(), req.target_user_id.as_str()]).await;
                }
                response.matched = result.matched;
                response.match_id = result.match_id;
            }
            Err(e) => {
                tracing::error!("Match evaluation failed for {} -> {}: {}", user_id, req.target_user_id, e);
                return swipe_error_response(&e);
            }
        }
    }

    tracing::debug!(
        "Swipe {:?} by {} on {}: remaining={}, matched={}",
        action,
        user_id,
        req.target_user_id,
        response.remaining,
        response.matched
    );

    HttpResponse::Ok().json(response)
}

async fn invalidate_matches(cache: &CacheManager, users: &[&str]) {
    for user in users {
        if let Err(e) = cache.delete(&CacheKey::matches(user)).await {
            tracing::warn!("Failed to invalidate match cache for {}: {}", user, e);
        }
    }
}

/// Current quota
///
/// GET /api/v1/quota
async fn quota_status(state: web::Data<AppState>, http_req: HttpRequest) -> impl Responder {
    let user_id = match authenticate(&state, &http_req).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.quota.status(&user_id, state.daily_limit, state.clock.now()).await {
        Ok(view) => HttpResponse::Ok().json(QuotaResponse {
            user_id,
            limit: state.daily_limit,
            used: view.used,
            remaining: view.remaining,
            window_start: view.window_start,
            resets_at: view.resets_at,
            is_premium: view.is_premium,
        }),
        Err(e) => {
            tracing::error!("Failed to read quota for {}: {}", user_id, e);
            swipe_error_response(&e)
        }
    }
}

/// Premium upgrade
///
/// POST /api/v1/premium/upgrade
///
/// Payment is handled elsewhere; this only flips the quota state.
async fn upgrade_premium(state: web::Data<AppState>, http_req: HttpRequest) -> impl Responder {
    let user_id = match authenticate(&state, &http_req).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.quota.upgrade_to_premium(&user_id, state.clock.now()).await {
        Ok(status) => HttpResponse::Ok().json(serde_json::json!({
            "userId": user_id,
            "isPremium": status.is_premium,
            "windowStart": status.window_start,
        })),
        Err(e) => {
            tracing::error!("Premium upgrade failed for {}: {}", user_id, e);
            swipe_error_response(&e)
        }
    }
}

/// Matches of the caller
///
/// GET /api/v1/matches
async fn list_matches(state: web::Data<AppState>, http_req: HttpRequest) -> impl Responder {
    let user_id = match authenticate(&state, &http_req).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    let cache_key = CacheKey::matches(&user_id);
    let epoch = state.cache.epoch();
    let matches = match state.cache.get::<Vec<MatchRecord>>(&cache_key).await {
        Ok(cached) => cached,
        Err(_) => match state.detector.matches_for(&user_id).await {
            Ok(records) => {
                if let Err(e) = state.cache.set_unless_invalidated(&cache_key, &records, epoch).await {
                    tracing::warn!("Failed to cache matches for {}: {}", user_id, e);
                }
                records
            }
            Err(e) => {
                tracing::error!("Failed to list matches for {}: {}", user_id, e);
                return swipe_error_response(&e);
            }
        },
    };

    HttpResponse::Ok().json(MatchesResponse {
        count: matches.len(),
        user_id,
        matches,
    })
}
