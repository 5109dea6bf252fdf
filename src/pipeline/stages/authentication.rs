use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::SessionValidator;
use crate::error::ApiError;
use crate::pipeline::context::{RequestContext, RequestMeta, SessionHandle};
use crate::pipeline::error::PipelineError;
use crate::pipeline::{Stage, StageOutcome};

/// Validates the inbound session and hydrates the user context. Routes
/// that skip auth state their reason so public access stays auditable.
pub struct AuthenticationStage {
    require_auth: bool,
    public_reason: Option<String>,
    validator: Arc<dyn SessionValidator>,
}

impl AuthenticationStage {
    pub fn required(validator: Arc<dyn SessionValidator>) -> Self {
        Self {
            require_auth: true,
            public_reason: None,
            validator,
        }
    }

    pub fn public(reason: &str, validator: Arc<dyn SessionValidator>) -> Self {
        Self {
            require_auth: false,
            public_reason: Some(reason.to_string()),
            validator,
        }
    }
}

#[async_trait]
impl Stage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn execute(
        &self,
        request: &RequestMeta,
        ctx: &mut RequestContext,
    ) -> Result<StageOutcome, PipelineError> {
        if !self.require_auth {
            if let Some(reason) = &self.public_reason {
                tracing::info!(
                    path = %request.path,
                    reason = %reason,
                    "public route, authentication skipped"
                );
            }
            return Ok(StageOutcome::Continue);
        }

        let started = Instant::now();
        let session = self.validator.validate(request).await;
        tracing::debug!(duration = ?started.elapsed(), "session validation finished");

        let Some(session) = session else {
            // Security event, not an application error.
            tracing::warn!(
                path = %request.path,
                client_addr = %request.client_addr,
                "authentication failed: no valid session"
            );
            return Ok(StageOutcome::Halt(ApiError::unauthorized(
                "Authentication required",
            )));
        };

        let Some(user_context) = session.user_context else {
            // A valid token without a hydrated user context means the user
            // was deactivated after issuance or the session was invalidated
            // server-side. Force re-login with a 401 instead of masking it
            // as a server error.
            tracing::warn!(
                path = %request.path,
                user_id = %session.user_id,
                "authentication failed: session has no user context"
            );
            return Ok(StageOutcome::Halt(ApiError::unauthorized(
                "Session is no longer valid, please sign in again",
            )));
        };

        ctx.user_id = Some(session.user_id);
        ctx.user_context = Some(user_context);
        ctx.session = Some(SessionHandle {
            session_id: session.session_id,
            access_token: session.access_token,
        });

        Ok(StageOutcome::Continue)
    }
}
