#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use meridian_api::auth::user_context::OrganizationMembership;
use meridian_api::auth::{SessionValidator, UserContext, ValidatedSession};
use meridian_api::error::ApiError;
use meridian_api::organizations::Organization;
use meridian_api::permissions::Permission;
use meridian_api::pipeline::context::{RequestContext, RequestMeta};
use meridian_api::pipeline::error::PipelineError;
use meridian_api::pipeline::{Stage, StageOutcome};

pub fn perm(s: &str) -> Permission {
    s.parse().expect("test permission")
}

pub fn user_with_permissions(perms: &[&str]) -> UserContext {
    let mut user = UserContext::from_roles(Uuid::new_v4(), vec![]);
    user.all_permissions = perms.iter().map(|s| perm(s)).collect();
    user
}

pub fn member_of(mut user: UserContext, org_ids: &[Uuid]) -> UserContext {
    user.organizations = org_ids
        .iter()
        .map(|&organization_id| OrganizationMembership {
            organization_id,
            is_primary: false,
        })
        .collect();
    user
}

pub fn org(id: Uuid, parent: Option<Uuid>, practice_uids: Vec<i64>) -> Organization {
    Organization {
        id,
        parent_id: parent,
        name: format!("org-{}", id.simple()),
        is_active: true,
        deleted_at: None,
        practice_uids,
    }
}

pub fn session_for(user: &UserContext) -> ValidatedSession {
    ValidatedSession {
        user_id: user.user_id,
        email: "user@example.com".into(),
        session_id: Uuid::new_v4(),
        access_token: "test-token".into(),
        user_context: Some(user.clone()),
    }
}

/// Session validator returning a canned result.
pub struct StubValidator {
    pub session: Option<ValidatedSession>,
}

impl StubValidator {
    pub fn denying() -> Arc<Self> {
        Arc::new(Self { session: None })
    }

    pub fn allowing(user: &UserContext) -> Arc<Self> {
        Arc::new(Self {
            session: Some(session_for(user)),
        })
    }
}

#[async_trait]
impl SessionValidator for StubValidator {
    async fn validate(&self, _request: &RequestMeta) -> Option<ValidatedSession> {
        self.session.clone()
    }
}

/// Stage that counts invocations and optionally halts, for asserting
/// early-exit behavior.
pub struct CountingStage {
    pub name: &'static str,
    pub halt_with: Option<u16>,
    pub calls: Arc<AtomicUsize>,
}

impl CountingStage {
    pub fn passing(name: &'static str) -> (Box<dyn Stage>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let stage = Self { name, halt_with: None, calls: calls.clone() };
        (Box::new(stage), calls)
    }

    pub fn halting(name: &'static str, status: u16) -> (Box<dyn Stage>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let stage = Self { name, halt_with: Some(status), calls: calls.clone() };
        (Box::new(stage), calls)
    }
}

#[async_trait]
impl Stage for CountingStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(
        &self,
        _request: &RequestMeta,
        _ctx: &mut RequestContext,
    ) -> Result<StageOutcome, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.halt_with {
            Some(401) => Ok(StageOutcome::Halt(ApiError::unauthorized("denied"))),
            Some(403) => Ok(StageOutcome::Halt(ApiError::forbidden("denied"))),
            Some(status) => Ok(StageOutcome::Halt(ApiError::internal_server_error(format!(
                "unexpected test status {}",
                status
            )))),
            None => Ok(StageOutcome::Continue),
        }
    }
}
