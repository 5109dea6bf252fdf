use std::time::Duration;

use crate::ratelimit::RateLimitKind;

/// Injected observer for pipeline telemetry. The default is a no-op so the
/// pipeline never depends on a metrics backend being present.
pub trait MetricsSink: Send + Sync {
    fn stage_completed(&self, stage: &str, duration: Duration) {
        let _ = (stage, duration);
    }

    fn authentication_failed(&self, path: &str) {
        let _ = path;
    }

    fn authorization_denied(&self, path: &str) {
        let _ = path;
    }

    fn rate_limit_rejected(&self, kind: RateLimitKind) {
        let _ = kind;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}
