use async_trait::async_trait;
use std::sync::Arc;

use crate::pipeline::context::{RequestContext, RequestMeta};
use crate::pipeline::error::PipelineError;
use crate::pipeline::{Stage, StageOutcome};
use crate::ratelimit::{RateLimitKind, RateLimiter};

/// Optional throttle keyed by client address. Routes that opt out simply
/// construct the stage without a limit kind. A violation leaves the
/// structured halt channel entirely and propagates as
/// `PipelineError::RateLimited` for the route boundary to translate.
pub struct RateLimitStage {
    kind: Option<RateLimitKind>,
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitStage {
    pub fn new(kind: Option<RateLimitKind>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { kind, limiter }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn execute(
        &self,
        request: &RequestMeta,
        _ctx: &mut RequestContext,
    ) -> Result<StageOutcome, PipelineError> {
        let Some(kind) = self.kind else {
            return Ok(StageOutcome::Continue);
        };

        match self.limiter.check(&request.client_addr, kind).await {
            Ok(()) => Ok(StageOutcome::Continue),
            Err(exceeded) => {
                tracing::warn!(
                    client_addr = %request.client_addr,
                    kind = kind.as_str(),
                    retry_after = ?exceeded.retry_after,
                    "rate limit exceeded"
                );
                Err(PipelineError::from(exceeded))
            }
        }
    }
}
