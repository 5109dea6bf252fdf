use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::auth::UserContext;

/// Route classes served by the API, mirroring the handler tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteArchetype {
    Public,
    Protected,
    Elevated,
}

/// Inbound request metadata the pipeline consumes. Built once from the
/// transport layer so stages stay independent of axum types.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub client_addr: String,
    pub user_agent: Option<String>,
    /// `x-correlation-id` header, when the caller supplied one.
    pub correlation_id: Option<String>,
    /// `x-request-id` from an upstream proxy, when present.
    pub upstream_request_id: Option<String>,
    pub bearer_token: Option<String>,
}

impl RequestMeta {
    pub fn new(method: &str, path: &str, client_addr: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            client_addr: client_addr.to_string(),
            user_agent: None,
            correlation_id: None,
            upstream_request_id: None,
            bearer_token: None,
        }
    }
}

/// Session handle attached by the authentication stage.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub access_token: String,
}

/// Per-request accumulator threaded through every stage. Request-local and
/// additive-only: stages set fields, nothing ever removes one, which is
/// what keeps concurrent requests safe without locks.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub archetype: RouteArchetype,
    pub started_at: Instant,
    pub correlation_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub user_context: Option<UserContext>,
    pub session: Option<SessionHandle>,
    pub authorization_denied: bool,
    pub stage_timings: HashMap<String, Duration>,
}

impl RequestContext {
    pub fn new(archetype: RouteArchetype) -> Self {
        Self {
            archetype,
            started_at: Instant::now(),
            correlation_id: None,
            user_id: None,
            user_context: None,
            session: None,
            authorization_denied: false,
            stage_timings: HashMap::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
