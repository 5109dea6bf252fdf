use async_trait::async_trait;
use uuid::Uuid;

use crate::pipeline::context::{RequestContext, RequestMeta};
use crate::pipeline::error::PipelineError;
use crate::pipeline::{Stage, StageOutcome};

/// First stage of every pipeline: pins a correlation id to the context and
/// records the request trace fields. Has no failure path.
#[derive(Debug, Default)]
pub struct CorrelationStage;

impl CorrelationStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for CorrelationStage {
    fn name(&self) -> &'static str {
        "correlation"
    }

    async fn execute(
        &self,
        request: &RequestMeta,
        ctx: &mut RequestContext,
    ) -> Result<StageOutcome, PipelineError> {
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        tracing::info!(
            correlation_id = %correlation_id,
            method = %request.method,
            path = %request.path,
            client_addr = %request.client_addr,
            user_agent = request.user_agent.as_deref().unwrap_or("-"),
            upstream_request_id = request.upstream_request_id.as_deref().unwrap_or("-"),
            "request received"
        );

        ctx.correlation_id = Some(correlation_id);
        Ok(StageOutcome::Continue)
    }
}
