pub mod context;
pub mod error;
pub mod stages;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiError;
use crate::metrics::{MetricsSink, NoopMetrics};

pub use context::{RequestContext, RequestMeta, RouteArchetype, SessionHandle};
pub use error::PipelineError;

/// What one stage decided about the request.
#[derive(Debug)]
pub enum StageOutcome {
    /// Stage finished; run the next one.
    Continue,
    /// Stop the pipeline and answer with this response. A halt carries its
    /// response by construction, so "failure without a response" cannot be
    /// represented.
    Halt(ApiError),
}

/// One unit of request pre-processing. Stages read the request metadata,
/// extend the shared context, and either continue or halt.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable name used for timing buckets, diagnostics and logs.
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        request: &RequestMeta,
        ctx: &mut RequestContext,
    ) -> Result<StageOutcome, PipelineError>;
}

/// Terminal state of one pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every stage continued; the handler may run with the final context.
    Completed,
    /// A stage halted the request with this response.
    Halted(ApiError),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Completed)
    }
}

/// Runs an ordered list of stages over a shared request context, stopping
/// at the first halt. Construction order is the ordering guarantee: a
/// later stage may assume everything earlier stages attach is present.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    metrics: Arc<dyn MetricsSink>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Ordered stage names, for diagnostics.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(
        &self,
        request: &RequestMeta,
        ctx: &mut RequestContext,
    ) -> Result<PipelineOutcome, PipelineError> {
        for stage in &self.stages {
            let started = Instant::now();
            let result = stage.execute(request, ctx).await;
            let duration = started.elapsed();

            ctx.stage_timings.insert(stage.name().to_string(), duration);
            self.metrics.stage_completed(stage.name(), duration);

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let PipelineError::RateLimited(exceeded) = &err {
                        self.metrics.rate_limit_rejected(exceeded.kind);
                    }
                    return Err(err);
                }
            };

            match outcome {
                StageOutcome::Continue => {
                    tracing::debug!(stage = stage.name(), ?duration, "stage continued");
                }
                StageOutcome::Halt(response) => {
                    match response.status_code() {
                        401 => self.metrics.authentication_failed(&request.path),
                        403 => self.metrics.authorization_denied(&request.path),
                        _ => {}
                    }
                    tracing::info!(
                        stage = stage.name(),
                        status = response.status_code(),
                        ?duration,
                        "pipeline halted"
                    );
                    return Ok(PipelineOutcome::Halted(response));
                }
            }
        }

        Ok(PipelineOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingStage {
        name: &'static str,
        halt: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stage for RecordingStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &self,
            _request: &RequestMeta,
            _ctx: &mut RequestContext,
        ) -> Result<StageOutcome, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.halt {
                Ok(StageOutcome::Halt(ApiError::forbidden("halted")))
            } else {
                Ok(StageOutcome::Continue)
            }
        }
    }

    fn stage(name: &'static str, halt: bool) -> (Box<dyn Stage>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let stage = RecordingStage { name, halt, calls: calls.clone() };
        (Box::new(stage), calls)
    }

    #[tokio::test]
    async fn runs_all_stages_in_order_on_success() {
        let (first, first_calls) = stage("first", false);
        let (second, second_calls) = stage("second", false);
        let pipeline = Pipeline::new(vec![first, second]);

        let request = RequestMeta::new("GET", "/api/ping", "127.0.0.1");
        let mut ctx = RequestContext::new(RouteArchetype::Protected);

        let outcome = pipeline.execute(&request, &mut ctx).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert!(ctx.stage_timings.contains_key("first"));
        assert!(ctx.stage_timings.contains_key("second"));
    }

    #[tokio::test]
    async fn halt_skips_every_later_stage() {
        let (first, first_calls) = stage("first", false);
        let (second, second_calls) = stage("second", true);
        let (third, third_calls) = stage("third", false);
        let pipeline = Pipeline::new(vec![first, second, third]);

        let request = RequestMeta::new("GET", "/api/ping", "127.0.0.1");
        let mut ctx = RequestContext::new(RouteArchetype::Protected);

        let outcome = pipeline.execute(&request, &mut ctx).await.unwrap();
        match outcome {
            PipelineOutcome::Halted(resp) => assert_eq!(resp.status_code(), 403),
            PipelineOutcome::Completed => panic!("expected halt"),
        }
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        // The halting stage is still timed.
        assert!(ctx.stage_timings.contains_key("second"));
        assert!(!ctx.stage_timings.contains_key("third"));
    }

    #[tokio::test]
    async fn exposes_configured_stage_names() {
        let (first, _) = stage("first", false);
        let (second, _) = stage("second", false);
        let pipeline = Pipeline::new(vec![first, second]);

        assert_eq!(pipeline.stage_names(), vec!["first", "second"]);
    }
}
