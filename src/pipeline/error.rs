use thiserror::Error;

use crate::ratelimit::RateLimitExceeded;

/// Failures outside the structured halt channel. A structured stage halt
/// (401/403) travels as `StageOutcome::Halt`; these variants are the
/// exceptional modes the route boundary translates separately.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Client exceeded a limit class. Translated to 429 at the boundary,
    /// never surfaced as a structured stage failure.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// Misconfigured pipeline wiring, e.g. the authorization stage running
    /// without an authentication stage ahead of it. Programmer error, not
    /// a user-facing condition; surfaces loudly as a 500.
    #[error("pipeline invariant violated in stage '{stage}': {reason}")]
    InvariantViolation { stage: &'static str, reason: String },
}
