pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use pg::PgOrganizationSource;

/// One node in the organization graph. Organizations form a forest via
/// `parent_id`; each directly owns zero or more practice partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub practice_uids: Vec<i64>,
}

impl Organization {
    /// Active and not soft-deleted; only these contribute to access sets.
    pub fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

#[derive(Debug, Error)]
pub enum OrganizationSourceError {
    #[error("organization source unavailable: {0}")]
    Unavailable(String),

    #[error("organization query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Read-only supplier of the complete organization graph. The pipeline
/// treats this as an external collaborator; caching and invalidation are
/// the implementation's concern.
#[async_trait]
pub trait OrganizationSource: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Organization>, OrganizationSourceError>;
}

/// In-memory source for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrganizationSource {
    organizations: Vec<Organization>,
}

impl MemoryOrganizationSource {
    pub fn new(organizations: Vec<Organization>) -> Self {
        Self { organizations }
    }
}

#[async_trait]
impl OrganizationSource for MemoryOrganizationSource {
    async fn load_all(&self) -> Result<Vec<Organization>, OrganizationSourceError> {
        Ok(self.organizations.clone())
    }
}
