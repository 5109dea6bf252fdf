use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Breadth of a permission grant, narrowest to broadest.
/// Ordering matters: the access resolver always honors the broadest
/// scope a user holds for a given resource/action pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    Own,
    Organization,
    All,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::Own => "own",
            PermissionScope::Organization => "organization",
            PermissionScope::All => "all",
        }
    }
}

impl FromStr for PermissionScope {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "own" => Ok(PermissionScope::Own),
            "organization" => Ok(PermissionScope::Organization),
            "all" => Ok(PermissionScope::All),
            other => Err(PermissionParseError::UnknownScope(other.to_string())),
        }
    }
}

/// A single permission in `resource:action:scope` form,
/// e.g. `dashboards:read:organization`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    pub resource: String,
    pub action: String,
    pub scope: PermissionScope,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("permission '{0}' is not in resource:action:scope form")]
    MalformedTriple(String),

    #[error("unknown permission scope '{0}'")]
    UnknownScope(String),
}

impl Permission {
    pub fn new(resource: &str, action: &str, scope: PermissionScope) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
            scope,
        }
    }

    /// True when this grant covers the given resource/action pair,
    /// regardless of scope.
    pub fn covers(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(resource), Some(action), Some(scope), None)
                if !resource.is_empty() && !action.is_empty() =>
            {
                Ok(Permission {
                    resource: resource.to_string(),
                    action: action.to_string(),
                    scope: scope.parse()?,
                })
            }
            _ => Err(PermissionParseError::MalformedTriple(s.to_string())),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope.as_str())
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> String {
        p.to_string()
    }
}

/// Exact-match check: the grant set contains the required triple.
pub fn holds(granted: &[Permission], required: &Permission) -> bool {
    granted.iter().any(|p| p == required)
}

/// OR semantics: at least one of the required permissions is granted.
pub fn holds_any(granted: &[Permission], required: &[Permission]) -> bool {
    required.iter().any(|r| holds(granted, r))
}

/// AND semantics: every required permission is granted.
pub fn holds_all(granted: &[Permission], required: &[Permission]) -> bool {
    required.iter().all(|r| holds(granted, r))
}

/// The broadest scope granted for a resource/action pair, if any.
/// This is the priority-order primitive behind tiered access resolution.
pub fn scope_for(granted: &[Permission], resource: &str, action: &str) -> Option<PermissionScope> {
    granted
        .iter()
        .filter(|p| p.covers(resource, action))
        .map(|p| p.scope)
        .max()
}
