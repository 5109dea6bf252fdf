use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use crate::error::ApiError;
use crate::pipeline::{Pipeline, PipelineOutcome, RequestContext, RequestMeta, RouteArchetype};

/// Build the pipeline's request view from an axum request. Client address
/// comes from `ConnectInfo` when the server was started with it; a proxy
/// deployment would substitute a forwarded-for extractor here.
pub fn extract_meta<B>(request: &Request<B>) -> RequestMeta {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let bearer_token = header("authorization")
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty());

    RequestMeta {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        client_addr,
        user_agent: header("user-agent"),
        correlation_id: header("x-correlation-id"),
        upstream_request_id: header("x-request-id"),
        bearer_token,
    }
}

/// Route-level boundary: run a pipeline and translate every failure mode
/// into a response. Structured halts pass through as-is; rate limiting
/// becomes 429 and invariant violations become 500 via `ApiError`.
pub async fn run_pipeline(
    pipeline: &Pipeline,
    archetype: RouteArchetype,
    meta: &RequestMeta,
) -> Result<RequestContext, Response> {
    let mut ctx = RequestContext::new(archetype);

    match pipeline.execute(meta, &mut ctx).await {
        Ok(PipelineOutcome::Completed) => Ok(ctx),
        Ok(PipelineOutcome::Halted(response)) => Err(response.into_response()),
        Err(err) => Err(ApiError::from(err).into_response()),
    }
}
