use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use uuid::Uuid;

use meridian_api::access::AccessResolver;
use meridian_api::auth::{
    generate_jwt, Claims, JwtSessionValidator, MemoryUserContextStore, SessionValidator,
    UserContext,
};
use meridian_api::config::Environment;
use meridian_api::error::ApiError;
use meridian_api::http::{extract_meta, run_pipeline};
use meridian_api::organizations::MemoryOrganizationSource;
use meridian_api::pipeline::stages::{
    AuthenticationStage, AuthorizationStage, CorrelationStage, RateLimitStage,
};
use meridian_api::pipeline::{Pipeline, RouteArchetype};
use meridian_api::ratelimit::{MemoryRateLimiter, RateLimitKind, RateLimiter};

#[derive(Clone)]
struct AppState {
    protected: Arc<Pipeline>,
    resolver: Arc<AccessResolver>,
}

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up SECURITY_JWT_SECRET etc.
    let _ = dotenvy::dotenv();

    let config = meridian_api::config::config();
    tracing_subscriber::fmt::init();
    tracing::info!("Starting Meridian API in {:?} mode", config.environment);

    let app = app().await;

    // Allow tests or deployments to override port via env
    let port = std::env::var("MERIDIAN_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Meridian API listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server");
}

async fn app() -> Router {
    let store = Arc::new(MemoryUserContextStore::new());

    // The in-memory store starts empty, which 401s every token. In
    // development, seed a demo user and log a bearer token for it so the
    // protected routes are exercisable out of the box.
    if meridian_api::config::config().environment == Environment::Development {
        let mut demo = UserContext::from_roles(Uuid::new_v4(), vec![]);
        demo.all_permissions = vec!["patients:read:all".parse().expect("demo permission")];

        let claims = Claims::new(demo.user_id, "demo@meridian.local".into(), Uuid::new_v4());
        match generate_jwt(&claims) {
            Ok(token) => tracing::info!("Demo user {} token: Bearer {}", demo.user_id, token),
            Err(err) => tracing::warn!("Could not mint demo token: {}", err),
        }
        store.insert(demo).await;
    }

    let validator: Arc<dyn SessionValidator> = Arc::new(JwtSessionValidator::new(store));
    let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new());
    let source = Arc::new(MemoryOrganizationSource::default());

    let rate_limit_kind = meridian_api::config::config()
        .api
        .enable_rate_limiting
        .then_some(RateLimitKind::StandardApi);

    // Protected archetype: correlation → rate limit → authentication →
    // authorization. Construction order is the ordering contract.
    let protected = Pipeline::new(vec![
        Box::new(CorrelationStage::new()),
        Box::new(RateLimitStage::new(rate_limit_kind, limiter)),
        Box::new(AuthenticationStage::required(validator)),
        Box::new(AuthorizationStage::any_of(vec![
            "patients:read:all".parse().expect("route permission"),
            "patients:read:organization".parse().expect("route permission"),
            "patients:read:own".parse().expect("route permission"),
        ])),
    ]);

    let state = AppState {
        protected: Arc::new(protected),
        resolver: Arc::new(AccessResolver::new(source)),
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/whoami", get(whoami))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Meridian API",
            "version": version,
            "description": "Multi-tenant practice management backend",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "whoami": "/api/whoami (protected)",
            }
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now()
        }
    }))
}

/// Demo protected route: runs the full pipeline, then reports the caller's
/// identity and resolved practice access.
async fn whoami(State(state): State<AppState>, request: Request<Body>) -> Response {
    let meta = extract_meta(&request);

    let ctx = match run_pipeline(&state.protected, RouteArchetype::Protected, &meta).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    // The authorization stage guarantees the user context is present here.
    let Some(user) = ctx.user_context.as_ref() else {
        return ApiError::internal_server_error("An internal error occurred").into_response();
    };

    let access = match state
        .resolver
        .accessible_practice_uids(user, "patients", "read")
        .await
    {
        Ok(access) => access,
        Err(err) => return ApiError::from(err).into_response(),
    };

    Json(json!({
        "success": true,
        "data": {
            "user_id": user.user_id,
            "correlation_id": ctx.correlation_id,
            "permissions": user.all_permissions,
            "practice_access": access,
            "stages": ctx.stage_timings.keys().collect::<Vec<_>>()
        }
    }))
    .into_response()
}
