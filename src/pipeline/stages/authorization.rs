use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::UserContext;
use crate::error::ApiError;
use crate::permissions::{self, Permission, PermissionScope};
use crate::pipeline::context::{RequestContext, RequestMeta};
use crate::pipeline::error::PipelineError;
use crate::pipeline::{Stage, StageOutcome};

/// Pulls a target id (organization or resource owner) out of the request,
/// typically from a path segment or query parameter.
pub type TargetExtractor = Box<dyn Fn(&RequestMeta) -> Option<Uuid> + Send + Sync>;

/// Enforces the route's permission requirement against the authenticated
/// user. Must run after `AuthenticationStage`; a missing user context here
/// means the pipeline was miswired and is treated as an invariant
/// violation, not a user-facing denial.
pub struct AuthorizationStage {
    required: Vec<Permission>,
    require_all: bool,
    organization_target: Option<TargetExtractor>,
    owner_target: Option<TargetExtractor>,
}

impl AuthorizationStage {
    /// Any-of semantics over the required permissions (the default).
    pub fn any_of(required: Vec<Permission>) -> Self {
        Self {
            required,
            require_all: false,
            organization_target: None,
            owner_target: None,
        }
    }

    /// All-of semantics over the required permissions.
    pub fn all_of(required: Vec<Permission>) -> Self {
        Self {
            require_all: true,
            ..Self::any_of(required)
        }
    }

    /// Narrow organization-scoped grants by a target organization pulled
    /// from the request.
    pub fn with_organization_target(mut self, extractor: TargetExtractor) -> Self {
        self.organization_target = Some(extractor);
        self
    }

    /// Narrow own-scoped grants by the target resource's owner.
    pub fn with_owner_target(mut self, extractor: TargetExtractor) -> Self {
        self.owner_target = Some(extractor);
        self
    }

    /// A single requirement passes when it is granted and its scope
    /// narrowing (if any target was extracted) holds.
    fn requirement_satisfied(
        &self,
        user: &UserContext,
        request: &RequestMeta,
        required: &Permission,
    ) -> bool {
        if !permissions::holds(&user.all_permissions, required) {
            return false;
        }

        match required.scope {
            PermissionScope::All => true,
            PermissionScope::Organization => {
                match self.organization_target.as_ref().and_then(|f| f(request)) {
                    Some(org_id) => user.can_access_organization(org_id),
                    None => true,
                }
            }
            PermissionScope::Own => {
                match self.owner_target.as_ref().and_then(|f| f(request)) {
                    Some(owner_id) => owner_id == user.user_id,
                    None => true,
                }
            }
        }
    }
}

#[async_trait]
impl Stage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn execute(
        &self,
        request: &RequestMeta,
        ctx: &mut RequestContext,
    ) -> Result<StageOutcome, PipelineError> {
        let Some(user) = ctx.user_context.as_ref() else {
            tracing::error!(
                path = %request.path,
                "authorization stage ran without a user context; authentication stage missing or misordered"
            );
            return Err(PipelineError::InvariantViolation {
                stage: self.name(),
                reason: "user context absent; authentication stage missing or misordered".into(),
            });
        };

        let allowed = user.is_super_admin
            || if self.require_all {
                self.required
                    .iter()
                    .all(|p| self.requirement_satisfied(user, request, p))
            } else {
                self.required
                    .iter()
                    .any(|p| self.requirement_satisfied(user, request, p))
            };

        if !allowed {
            ctx.authorization_denied = true;
            // Denial is a normal structured outcome; logged as a security
            // event for audit trails.
            tracing::warn!(
                path = %request.path,
                user_id = %user.user_id,
                required = ?self.required.iter().map(ToString::to_string).collect::<Vec<_>>(),
                require_all = self.require_all,
                "authorization denied"
            );
            return Ok(StageOutcome::Halt(ApiError::forbidden(
                "Insufficient permissions",
            )));
        }

        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::RouteArchetype;

    fn perm(s: &str) -> Permission {
        s.parse().unwrap()
    }

    fn ctx_with_permissions(perms: &[&str]) -> RequestContext {
        let mut user = UserContext::from_roles(Uuid::new_v4(), vec![]);
        user.all_permissions = perms.iter().map(|s| perm(s)).collect();
        let mut ctx = RequestContext::new(RouteArchetype::Protected);
        ctx.user_context = Some(user);
        ctx
    }

    #[tokio::test]
    async fn missing_user_context_is_an_invariant_violation() {
        let stage = AuthorizationStage::any_of(vec![perm("patients:read:all")]);
        let request = RequestMeta::new("GET", "/api/patients", "127.0.0.1");
        let mut ctx = RequestContext::new(RouteArchetype::Protected);

        let err = stage.execute(&request, &mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvariantViolation { .. }));
    }

    #[tokio::test]
    async fn any_of_passes_with_one_match() {
        let stage = AuthorizationStage::any_of(vec![
            perm("patients:read:all"),
            perm("patients:read:organization"),
        ]);
        let request = RequestMeta::new("GET", "/api/patients", "127.0.0.1");
        let mut ctx = ctx_with_permissions(&["patients:read:organization"]);

        let outcome = stage.execute(&request, &mut ctx).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Continue));
        assert!(!ctx.authorization_denied);
    }

    #[tokio::test]
    async fn all_of_requires_every_permission() {
        let stage = AuthorizationStage::all_of(vec![
            perm("patients:read:all"),
            perm("patients:export:all"),
        ]);
        let request = RequestMeta::new("GET", "/api/patients/export", "127.0.0.1");

        let mut partial = ctx_with_permissions(&["patients:read:all"]);
        match stage.execute(&request, &mut partial).await.unwrap() {
            StageOutcome::Halt(resp) => assert_eq!(resp.status_code(), 403),
            StageOutcome::Continue => panic!("expected halt"),
        }
        assert!(partial.authorization_denied);

        let mut full = ctx_with_permissions(&["patients:read:all", "patients:export:all"]);
        let outcome = stage.execute(&request, &mut full).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Continue));
    }

    #[tokio::test]
    async fn organization_scope_narrows_by_extracted_target() {
        let target_org = Uuid::new_v4();
        let stage = AuthorizationStage::any_of(vec![perm("patients:read:organization")])
            .with_organization_target(Box::new(move |_req| Some(target_org)));
        let request = RequestMeta::new("GET", "/api/patients", "127.0.0.1");

        let mut outside = ctx_with_permissions(&["patients:read:organization"]);
        match stage.execute(&request, &mut outside).await.unwrap() {
            StageOutcome::Halt(resp) => assert_eq!(resp.status_code(), 403),
            StageOutcome::Continue => panic!("expected halt"),
        }

        let mut inside = ctx_with_permissions(&["patients:read:organization"]);
        inside
            .user_context
            .as_mut()
            .unwrap()
            .accessible_organization_ids
            .push(target_org);
        let outcome = stage.execute(&request, &mut inside).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Continue));
    }

    #[tokio::test]
    async fn own_scope_narrows_by_resource_owner() {
        let owner = Uuid::new_v4();
        let stage = AuthorizationStage::any_of(vec![perm("notes:write:own")])
            .with_owner_target(Box::new(move |_req| Some(owner)));
        let request = RequestMeta::new("PUT", "/api/notes/1", "127.0.0.1");

        let mut not_owner = ctx_with_permissions(&["notes:write:own"]);
        assert!(matches!(
            stage.execute(&request, &mut not_owner).await.unwrap(),
            StageOutcome::Halt(_)
        ));

        let mut is_owner = ctx_with_permissions(&["notes:write:own"]);
        is_owner.user_context.as_mut().unwrap().user_id = owner;
        assert!(matches!(
            stage.execute(&request, &mut is_owner).await.unwrap(),
            StageOutcome::Continue
        ));
    }

    #[tokio::test]
    async fn super_admin_bypasses_permission_checks() {
        let stage = AuthorizationStage::all_of(vec![perm("anything:admin:all")]);
        let request = RequestMeta::new("POST", "/api/admin", "127.0.0.1");
        let mut ctx = ctx_with_permissions(&[]);
        ctx.user_context.as_mut().unwrap().is_super_admin = true;

        let outcome = stage.execute(&request, &mut ctx).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Continue));
    }
}
