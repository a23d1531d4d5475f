//! Postgres-backed membership store.
//!
//! Reads run inside a short transaction with `app.bypass_rls = on`: resolving
//! a grant has to see memberships before any row-level policy can be derived
//! from them.
//!
//! ## Tables
//!
//! | Table | Columns read |
//! |-------|--------------|
//! | `persons` | `id`, `idp_id` |
//! | `person_client_access` | `id`, `person_id`, `client_id`, `site_id`, `role_id`, `is_primary`, `created_at`, `revoked_at` |
//! | `roles` | `id`, `name`, `scope`, `capabilities text[]` |
//! | `clients` | `id`, `status` |
//! | `sites` | `id`, `client_id`, `parent_id`, `is_primary`, `status`, `created_at`, `deleted_at` |
//!
//! ## Error Mapping
//!
//! Every sqlx error becomes [`StoreError::Unavailable`]; rows that fail to
//! decode become [`StoreError::Decode`]. Roles with an unknown scope label are
//! skipped with a warning rather than failing the whole resolution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn, Span};
use uuid::Uuid;

use inspectra_auth::{CapabilitySet, ClientStatus, IdpId, RoleGrantRecord, Scope, SiteStatus};
use inspectra_core::{ClientId, MembershipId, RoleId, SiteId};

use super::store::{MembershipStore, SiteRecord, StoreError};
use crate::audit;

#[derive(Debug, Clone)]
pub struct PgMembershipStore {
    pool: Arc<PgPool>,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn begin_bypass(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        audit::policy_bypass(audit::MEMBERSHIP_LOOKUP, Some(operation));
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(operation, e))?;
        sqlx::query("SELECT set_config('app.bypass_rls', 'on', true)")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(tx)
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    #[instrument(
        skip_all,
        fields(idp_id = %principal, operation = "grants_for", grant_count = tracing::field::Empty),
        err
    )]
    async fn grants_for(&self, principal: &IdpId) -> Result<Vec<RoleGrantRecord>, StoreError> {
        let mut tx = self.begin_bypass("grants_for").await?;
        let rows = sqlx::query(
            r#"
            SELECT
                pca.id AS membership_id,
                pca.client_id,
                pca.site_id,
                r.id AS role_id,
                r.name AS role_name,
                r.scope,
                r.capabilities,
                pca.is_primary,
                pca.created_at
            FROM person_client_access pca
            JOIN persons p ON p.id = pca.person_id
            JOIN roles r ON r.id = pca.role_id
            WHERE p.idp_id = $1 AND pca.revoked_at IS NULL
            ORDER BY pca.is_primary DESC, pca.created_at ASC
            "#,
        )
        .bind(principal.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("grants_for", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("grants_for", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let row = GrantRow::from_row(&row).map_err(|e| StoreError::Decode {
                entity: "role grant",
                message: e.to_string(),
            })?;
            match row.scope.parse::<Scope>() {
                Ok(scope) => records.push(row.into_record(scope)),
                Err(e) => warn!(
                    membership_id = %row.membership_id,
                    error = %e,
                    "skipping membership with unknown scope"
                ),
            }
        }

        Span::current().record("grant_count", records.len());
        Ok(records)
    }

    #[instrument(skip(self), fields(operation = "client_status"), err)]
    async fn client_status(&self, client_id: ClientId) -> Result<Option<ClientStatus>, StoreError> {
        let mut tx = self.begin_bypass("client_status").await?;
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM clients WHERE id = $1")
            .bind(client_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("client_status", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("client_status", e))?;

        status
            .map(|s| {
                s.parse::<ClientStatus>().map_err(|e| StoreError::Decode {
                    entity: "client status",
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    #[instrument(skip(self), fields(operation = "site_status"), err)]
    async fn site_status(&self, client_id: ClientId, site_id: SiteId) -> Result<Option<SiteStatus>, StoreError> {
        let mut tx = self.begin_bypass("site_status").await?;
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM sites WHERE id = $1 AND client_id = $2 AND deleted_at IS NULL")
                .bind(site_id.as_uuid())
                .bind(client_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("site_status", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("site_status", e))?;

        status
            .map(|s| {
                s.parse::<SiteStatus>().map_err(|e| StoreError::Decode {
                    entity: "site status",
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    #[instrument(skip(self), fields(operation = "sites_for_client"), err)]
    async fn sites_for_client(&self, client_id: ClientId) -> Result<Vec<SiteRecord>, StoreError> {
        let mut tx = self.begin_bypass("sites_for_client").await?;
        let rows = sqlx::query(
            r#"
            SELECT id, client_id, parent_id, is_primary, status, created_at
            FROM sites
            WHERE client_id = $1 AND deleted_at IS NULL
            ORDER BY is_primary DESC, created_at ASC, id ASC
            "#,
        )
        .bind(client_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("sites_for_client", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("sites_for_client", e))?;

        rows.iter()
            .map(|row| {
                let row = SiteRow::from_row(row).map_err(|e| StoreError::Decode {
                    entity: "site",
                    message: e.to_string(),
                })?;
                let status = row.status.parse::<SiteStatus>().map_err(|e| StoreError::Decode {
                    entity: "site status",
                    message: e.to_string(),
                })?;
                Ok(SiteRecord {
                    id: SiteId::from_uuid(row.id),
                    client_id: ClientId::from_uuid(row.client_id),
                    parent_id: row.parent_id.map(SiteId::from_uuid),
                    is_primary: row.is_primary,
                    status,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

struct GrantRow {
    membership_id: Uuid,
    client_id: Uuid,
    site_id: Option<Uuid>,
    role_id: Uuid,
    role_name: String,
    scope: String,
    capabilities: Option<Vec<String>>,
    is_primary: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for GrantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GrantRow {
            membership_id: row.try_get("membership_id")?,
            client_id: row.try_get("client_id")?,
            site_id: row.try_get("site_id")?,
            role_id: row.try_get("role_id")?,
            role_name: row.try_get("role_name")?,
            scope: row.try_get("scope")?,
            capabilities: row.try_get("capabilities")?,
            is_primary: row.try_get("is_primary")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl GrantRow {
    fn into_record(self, scope: Scope) -> RoleGrantRecord {
        RoleGrantRecord {
            membership_id: MembershipId::from_uuid(self.membership_id),
            client_id: ClientId::from_uuid(self.client_id),
            site_id: self.site_id.map(SiteId::from_uuid),
            role_id: RoleId::from_uuid(self.role_id),
            role_name: self.role_name,
            scope,
            capabilities: CapabilitySet::from_stored(self.capabilities.unwrap_or_default()),
            is_primary: self.is_primary,
            created_at: self.created_at,
        }
    }
}

struct SiteRow {
    id: Uuid,
    client_id: Uuid,
    parent_id: Option<Uuid>,
    is_primary: bool,
    status: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SiteRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SiteRow {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            parent_id: row.try_get("parent_id")?,
            is_primary: row.try_get("is_primary")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Unavailable(match db_err.code() {
            Some(code) => format!("database error in {operation} ({code}): {}", db_err.message()),
            None => format!("database error in {operation}: {}", db_err.message()),
        }),
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { index, source } => StoreError::Decode {
            entity: "column",
            message: format!("{index} in {operation}: {source}"),
        },
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
