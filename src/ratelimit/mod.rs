use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Named limit classes, strictest to most generous. Each route archetype
/// picks the class matching its cost profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    /// Interactive login attempts; brute-force resistant.
    LoginAuth,
    /// Multi-factor code verification; very strict.
    MfaVerify,
    /// General API traffic.
    StandardApi,
    /// File/image uploads.
    Upload,
    /// Polling endpoints; very generous.
    HighFrequencyRead,
    /// Expensive admin batch operations; near-singleton.
    AdminBatch,
}

/// Requests allowed per window for one limit class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitQuota {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKind::LoginAuth => "login_auth",
            RateLimitKind::MfaVerify => "mfa_verify",
            RateLimitKind::StandardApi => "standard_api",
            RateLimitKind::Upload => "upload",
            RateLimitKind::HighFrequencyRead => "high_frequency_read",
            RateLimitKind::AdminBatch => "admin_batch",
        }
    }

    pub fn quota(&self) -> RateLimitQuota {
        match self {
            RateLimitKind::LoginAuth => RateLimitQuota {
                max_requests: 10,
                window: Duration::from_secs(15 * 60),
            },
            RateLimitKind::MfaVerify => RateLimitQuota {
                max_requests: 5,
                window: Duration::from_secs(15 * 60),
            },
            RateLimitKind::StandardApi => RateLimitQuota {
                max_requests: 300,
                window: Duration::from_secs(60),
            },
            RateLimitKind::Upload => RateLimitQuota {
                max_requests: 50,
                window: Duration::from_secs(60 * 60),
            },
            RateLimitKind::HighFrequencyRead => RateLimitQuota {
                max_requests: 1200,
                window: Duration::from_secs(60),
            },
            RateLimitKind::AdminBatch => RateLimitQuota {
                max_requests: 2,
                window: Duration::from_secs(60 * 60),
            },
        }
    }
}

/// A limit violation. Deliberately its own type so callers exhaustively
/// handle it instead of pattern-matching a generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rate limit {kind:?} exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub kind: RateLimitKind,
    pub retry_after: Duration,
}

/// External limiter keyed by client address and limit class.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, client_addr: &str, kind: RateLimitKind) -> Result<(), RateLimitExceeded>;
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window in-memory limiter, the default collaborator. State is
/// per-process; a shared deployment would put a distributed limiter
/// behind the same trait.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<(String, RateLimitKind), Window>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, client_addr: &str, kind: RateLimitKind) -> Result<(), RateLimitExceeded> {
        let quota = kind.quota();
        let now = Instant::now();
        let key = (client_addr.to_string(), kind);

        let mut windows = self.windows.lock().await;
        // Every check sweeps expired windows, the touched key included, so
        // one-off clients do not accumulate in the map.
        windows.retain(|(_, kind), window| now.duration_since(window.started) < kind.quota().window);

        let window = windows.entry(key).or_insert(Window { started: now, count: 0 });

        if window.count >= quota.max_requests {
            let retry_after = quota.window.saturating_sub(now.duration_since(window.started));
            return Err(RateLimitExceeded { kind, retry_after });
        }

        window.count += 1;
        Ok(())
    }
}
