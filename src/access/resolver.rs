use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::UserContext;
use crate::config;
use crate::organizations::{OrganizationSource, OrganizationSourceError};
use crate::permissions::{self, PermissionScope};

use super::hierarchy::expand_hierarchy;

/// Tier under which a user's data access was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    All,
    Organization,
    Own,
    None,
}

/// Resolved practice-partition access for one user and resource/action.
///
/// An empty `practice_uids` under `AccessScope::All` is the "no filter"
/// sentinel; the same empty array under `Organization` or `Own` means zero
/// accessible rows. Callers must branch on `scope`, never on the array
/// alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeAccess {
    pub practice_uids: Vec<i64>,
    pub scope: AccessScope,
    /// Organizations that contributed practice uids, hierarchy included.
    pub organization_ids: Vec<Uuid>,
    /// True when any membership expanded past the root organization.
    pub includes_hierarchy: bool,
}

impl PracticeAccess {
    fn closed(scope: AccessScope) -> Self {
        Self {
            practice_uids: Vec::new(),
            scope,
            organization_ids: Vec::new(),
            includes_hierarchy: false,
        }
    }
}

/// Resolved owner-identifier filter, the own-scope counterpart of
/// `PracticeAccess`. All- and organization-scope users do not filter by
/// owner, so their `provider_id` is `None` by design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccess {
    pub provider_id: Option<i64>,
    pub scope: AccessScope,
}

/// Computes what tenant data a user may see. Fail-closed throughout:
/// missing configuration yields an empty access set, never a wildcard.
pub struct AccessResolver {
    source: Arc<dyn OrganizationSource>,
}

impl AccessResolver {
    pub fn new(source: Arc<dyn OrganizationSource>) -> Self {
        Self { source }
    }

    fn granted_scope(user: &UserContext, resource: &str, action: &str) -> Option<PermissionScope> {
        if user.is_super_admin {
            return Some(PermissionScope::All);
        }
        permissions::scope_for(&user.all_permissions, resource, action)
    }

    /// Resolve the set of practice uids the user may query for
    /// `resource:action`, checking tiers broadest-first.
    pub async fn accessible_practice_uids(
        &self,
        user: &UserContext,
        resource: &str,
        action: &str,
    ) -> Result<PracticeAccess, OrganizationSourceError> {
        match Self::granted_scope(user, resource, action) {
            Some(PermissionScope::All) => Ok(PracticeAccess::closed(AccessScope::All)),
            Some(PermissionScope::Organization) => {
                self.resolve_organization_tier(user, resource, action).await
            }
            Some(PermissionScope::Own) => Ok(PracticeAccess::closed(AccessScope::Own)),
            None => {
                tracing::warn!(
                    user_id = %user.user_id,
                    resource,
                    action,
                    "access denied: no recognized permission, failing closed"
                );
                Ok(PracticeAccess::closed(AccessScope::None))
            }
        }
    }

    async fn resolve_organization_tier(
        &self,
        user: &UserContext,
        resource: &str,
        action: &str,
    ) -> Result<PracticeAccess, OrganizationSourceError> {
        let graph = self.source.load_all().await?;
        let expand = config::config().access.expand_hierarchy;

        let mut practice_uids: Vec<i64> = Vec::new();
        let mut organization_ids: Vec<Uuid> = Vec::new();
        let mut includes_hierarchy = false;

        for membership in &user.organizations {
            let Some(org) = graph.iter().find(|o| o.id == membership.organization_id) else {
                continue;
            };
            if !org.is_usable() {
                continue;
            }

            if expand {
                let expansion = expand_hierarchy(org.id, &graph);
                includes_hierarchy |= expansion.expanded_beyond_root();
                practice_uids.extend(&expansion.practice_uids);
                for id in expansion.organization_ids {
                    if !organization_ids.contains(&id) {
                        organization_ids.push(id);
                    }
                }
            } else {
                practice_uids.extend(&org.practice_uids);
                if !organization_ids.contains(&org.id) {
                    organization_ids.push(org.id);
                }
            }
        }

        practice_uids.sort_unstable();
        practice_uids.dedup();

        if practice_uids.is_empty() && config::config().access.warn_on_empty_access {
            tracing::warn!(
                user_id = %user.user_id,
                resource,
                action,
                organization_count = user.organizations.len(),
                "organization-scope access resolved to zero practice uids, failing closed"
            );
        }

        Ok(PracticeAccess {
            practice_uids,
            scope: AccessScope::Organization,
            organization_ids,
            includes_hierarchy,
        })
    }

    /// Resolve the single-owner filter for `resource:action`. Only
    /// own-scope users filter by owner; a missing provider id on an
    /// own-scope user fails closed with a warning.
    pub fn provider_filter(&self, user: &UserContext, resource: &str, action: &str) -> ProviderAccess {
        match Self::granted_scope(user, resource, action) {
            Some(PermissionScope::All) => ProviderAccess { provider_id: None, scope: AccessScope::All },
            Some(PermissionScope::Organization) => {
                ProviderAccess { provider_id: None, scope: AccessScope::Organization }
            }
            Some(PermissionScope::Own) => {
                if user.provider_id.is_none() {
                    tracing::warn!(
                        user_id = %user.user_id,
                        resource,
                        action,
                        "own-scope user has no provider id configured, failing closed"
                    );
                }
                ProviderAccess { provider_id: user.provider_id, scope: AccessScope::Own }
            }
            None => {
                tracing::warn!(
                    user_id = %user.user_id,
                    resource,
                    action,
                    "provider filter denied: no recognized permission"
                );
                ProviderAccess { provider_id: None, scope: AccessScope::None }
            }
        }
    }

    /// Can the user touch one specific practice partition? Own-scope users
    /// filter on a different axis entirely, so the answer there is always
    /// false.
    pub async fn can_access_practice_uid(
        &self,
        user: &UserContext,
        resource: &str,
        action: &str,
        practice_uid: i64,
    ) -> Result<bool, OrganizationSourceError> {
        let access = self.accessible_practice_uids(user, resource, action).await?;
        Ok(match access.scope {
            AccessScope::All => true,
            AccessScope::Organization => access.practice_uids.contains(&practice_uid),
            AccessScope::Own | AccessScope::None => false,
        })
    }
}
