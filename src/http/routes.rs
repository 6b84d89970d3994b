//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameMatch;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::MatchSummary;

/// Longest display name accepted from a client
pub const MAX_DISPLAY_NAME_LEN: usize = 24;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (the socket authenticates through its query string)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    let protected_routes = Router::new()
        .route("/matches", post(create_match_handler))
        .route("/matches/:id/summary", get(summary_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    stored_summaries: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        stored_summaries: state.match_registry.stored_summaries(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct CreateMatchRequest {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Serialize)]
struct CreateMatchResponse {
    match_id: Uuid,
    ws_url: String,
}

async fn create_match_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<Json<CreateMatchResponse>, AppError> {
    if state.create_limiter.check().is_err() {
        return Err(AppError::TooManyRequests);
    }
    if let Some(existing) = state.match_registry.active_for(auth.user_id) {
        return Err(AppError::Conflict(format!(
            "Match {} is still running",
            existing
        )));
    }

    let display_name = sanitize_display_name(req.display_name.as_deref())
        .unwrap_or_else(|| auth.default_name.clone());

    let match_id = Uuid::new_v4();
    let seed: u64 = rand::random();
    let (game_match, handle) = GameMatch::new(
        match_id,
        seed,
        auth.user_id,
        display_name,
        &state.config.match_settings,
        state.economy.clone(),
    );
    state.match_registry.launch(game_match, handle);

    info!(match_id = %match_id, user_id = %auth.user_id, seed, "Solo match created");

    let ws_url = format!(
        "{}/ws?match_id={}",
        state
            .config
            .public_base_url
            .replace("https://", "wss://")
            .replace("http://", "ws://"),
        match_id
    );

    Ok(Json(CreateMatchResponse { match_id, ws_url }))
}

async fn summary_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    let stored = state
        .match_registry
        .summary(&match_id)
        .ok_or_else(|| AppError::NotFound(format!("No summary for match {}", match_id)))?;

    if stored.owner_id != auth.user_id {
        warn!(match_id = %match_id, user_id = %auth.user_id, "Summary requested by non-owner");
        return Err(AppError::Forbidden);
    }
    Ok(Json(stored.summary))
}

/// Trimmed, length-capped name, or `None` when nothing usable is left
fn sanitize_display_name(raw: Option<&str>) -> Option<String> {
    let name: String = raw?
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_DISPLAY_NAME_LEN)
        .collect();
    (!name.is_empty()).then_some(name)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests")]
    TooManyRequests,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Not your match".to_string()),
            AppError::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MatchSettings};
    use crate::ws::protocol::EntityMatchStats;

    fn test_state() -> AppState {
        AppState::new(Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            supabase_jwt_secret: "s3cret".to_string(),
            supabase_url: None,
            supabase_service_role_key: None,
            public_base_url: "http://localhost:8080".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            match_settings: MatchSettings::default(),
        })
    }

    fn user(user_id: Uuid) -> Extension<AuthenticatedUser> {
        Extension(AuthenticatedUser {
            user_id,
            default_name: "Ada".to_string(),
        })
    }

    fn finished_match() -> MatchSummary {
        let hero = EntityMatchStats {
            entity_id: Uuid::new_v4(),
            display_name: "Ada".to_string(),
            is_human: true,
            blocks_destroyed: 4,
            loot_collected: 2,
            loot_lost: 0,
            loot_secured: 2,
            rank: Some(1),
            killer_name: None,
        };
        MatchSummary {
            match_id: Uuid::new_v4(),
            is_victory: true,
            total_players: 16,
            duration_ms: 90_000,
            per_entity_stats: vec![hero.clone()],
            hero_stats: hero,
            ended_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_summary_is_only_served_to_its_owner() {
        let state = test_state();
        let owner = Uuid::new_v4();
        let summary = finished_match();
        let match_id = summary.match_id;
        state.match_registry.store_summary(owner, summary);

        let Json(served) = tokio_test::assert_ok!(
            summary_handler(State(state.clone()), user(owner), Path(match_id)).await
        );
        assert_eq!(served.match_id, match_id);

        let stranger = summary_handler(State(state.clone()), user(Uuid::new_v4()), Path(match_id)).await;
        assert!(matches!(stranger, Err(AppError::Forbidden)));

        let missing = summary_handler(State(state), user(owner), Path(Uuid::new_v4())).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_sanitize_display_name() {
        assert_eq!(sanitize_display_name(None), None);
        assert_eq!(sanitize_display_name(Some("   ")), None);
        assert_eq!(sanitize_display_name(Some("  Ada ")), Some("Ada".to_string()));

        let long = "x".repeat(100);
        assert_eq!(
            sanitize_display_name(Some(&long)).map(|n| n.len()),
            Some(MAX_DISPLAY_NAME_LEN)
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::TooManyRequests.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
