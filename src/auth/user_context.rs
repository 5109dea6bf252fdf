use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::Permission;

/// A named role and the permissions it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
}

/// Membership link between a user and one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub organization_id: Uuid,
    pub is_primary: bool,
}

/// Per-request snapshot of an authenticated user, hydrated by the identity
/// layer and read-only inside the pipeline. `all_permissions` is the
/// flattened union of role permissions, precomputed at hydration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub is_active: bool,
    pub is_verified: bool,
    pub roles: Vec<Role>,
    pub organizations: Vec<OrganizationMembership>,
    /// Organization ids this user may act within, pre-expanded through the
    /// hierarchy at hydration time.
    pub accessible_organization_ids: Vec<Uuid>,
    pub current_organization_id: Option<Uuid>,
    pub all_permissions: Vec<Permission>,
    pub is_super_admin: bool,
    /// Owner identifier for own-scope users (e.g. an individual provider).
    pub provider_id: Option<i64>,
}

impl UserContext {
    /// Build a context from roles, flattening permissions in role order.
    pub fn from_roles(user_id: Uuid, roles: Vec<Role>) -> Self {
        let mut all_permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for permission in &role.permissions {
                if !all_permissions.contains(permission) {
                    all_permissions.push(permission.clone());
                }
            }
        }

        Self {
            user_id,
            is_active: true,
            is_verified: true,
            roles,
            organizations: Vec::new(),
            accessible_organization_ids: Vec::new(),
            current_organization_id: None,
            all_permissions,
            is_super_admin: false,
            provider_id: None,
        }
    }

    pub fn can_access_organization(&self, organization_id: Uuid) -> bool {
        self.is_super_admin || self.accessible_organization_ids.contains(&organization_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionScope;

    #[test]
    fn from_roles_flattens_and_dedupes_permissions() {
        let read = Permission::new("patients", "read", PermissionScope::Organization);
        let write = Permission::new("patients", "write", PermissionScope::Own);
        let roles = vec![
            Role { name: "clinician".into(), permissions: vec![read.clone(), write.clone()] },
            Role { name: "auditor".into(), permissions: vec![read.clone()] },
        ];

        let ctx = UserContext::from_roles(Uuid::new_v4(), roles);
        assert_eq!(ctx.all_permissions, vec![read, write]);
    }

    #[test]
    fn super_admin_can_access_any_organization() {
        let mut ctx = UserContext::from_roles(Uuid::new_v4(), vec![]);
        let org = Uuid::new_v4();
        assert!(!ctx.can_access_organization(org));
        ctx.is_super_admin = true;
        assert!(ctx.can_access_organization(org));
    }
}
