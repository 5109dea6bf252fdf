use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{Organization, OrganizationSource, OrganizationSourceError};

/// Postgres-backed organization graph. Soft-deleted rows are returned with
/// their `deleted_at` marker intact so the access layer can exclude them
/// uniformly instead of the query silently hiding them.
pub struct PgOrganizationSource {
    pool: PgPool,
}

impl PgOrganizationSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationSource for PgOrganizationSource {
    async fn load_all(&self) -> Result<Vec<Organization>, OrganizationSourceError> {
        let query = r#"
            SELECT id, parent_id, name, is_active, deleted_at, practice_uids
            FROM organizations
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        let organizations = rows
            .into_iter()
            .map(|row| Organization {
                id: row.get("id"),
                parent_id: row.get("parent_id"),
                name: row.get("name"),
                is_active: row.get("is_active"),
                deleted_at: row.get("deleted_at"),
                practice_uids: row.get("practice_uids"),
            })
            .collect();

        Ok(organizations)
    }
}
