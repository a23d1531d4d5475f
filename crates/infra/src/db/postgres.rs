//! Postgres session backend.
//!
//! Policy settings use `set_config(name, value, true)`, which is scoped to
//! the current transaction: a pooled connection returned after commit or
//! rollback carries nothing over to its next user.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use super::error::DataAccessError;
use super::session::{validate_savepoint_name, Session, SessionBackend, SessionSetting};
use super::statement::{SqlParam, Statement, StatementKind, StatementOutcome};

#[derive(Debug, Clone)]
pub struct PgSessionBackend {
    pool: PgPool,
}

impl PgSessionBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionBackend for PgSessionBackend {
    async fn begin(&self) -> Result<Box<dyn Session>, DataAccessError> {
        let tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PgSession { tx }))
    }
}

pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    async fn run_plain(&mut self, operation: &str, sql: &str) -> Result<(), DataAccessError> {
        sqlx::query(sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn apply_settings(&mut self, settings: &[SessionSetting]) -> Result<(), DataAccessError> {
        if settings.is_empty() {
            return Ok(());
        }
        let sql = set_config_sql(settings.len());
        let mut query = sqlx::query(&sql);
        for setting in settings {
            query = query.bind(setting.name).bind(setting.value.as_str());
        }
        query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("apply_settings", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(kind = ?statement.kind, params = statement.params.len()), err)]
    async fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, DataAccessError> {
        let body = statement.sql.trim().trim_end_matches(';');
        match statement.kind {
            StatementKind::Query => {
                let sql = format!("WITH q AS ({body}) SELECT to_jsonb(q) AS row FROM q");
                let rows = bind_params(sqlx::query(&sql), &statement.params)
                    .fetch_all(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("query", e))?;
                let rows = rows
                    .iter()
                    .map(|row| row.try_get::<JsonValue, _>("row"))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| map_sqlx_error("query", e))?;
                Ok(StatementOutcome {
                    rows_affected: rows.len() as u64,
                    rows,
                })
            }
            StatementKind::Execute => {
                let result = bind_params(sqlx::query(body), &statement.params)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("execute", e))?;
                Ok(StatementOutcome {
                    rows_affected: result.rows_affected(),
                    rows: Vec::new(),
                })
            }
        }
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), DataAccessError> {
        validate_savepoint_name(name)?;
        self.run_plain("savepoint", &format!("SAVEPOINT {name}")).await
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DataAccessError> {
        validate_savepoint_name(name)?;
        self.run_plain("release_savepoint", &format!("RELEASE SAVEPOINT {name}")).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DataAccessError> {
        validate_savepoint_name(name)?;
        self.run_plain("rollback_to_savepoint", &format!("ROLLBACK TO SAVEPOINT {name}"))
            .await
    }

    async fn commit(self: Box<Self>) -> Result<(), DataAccessError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DataAccessError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// `SELECT set_config($1, $2, true), set_config($3, $4, true), ...`
fn set_config_sql(count: usize) -> String {
    let calls: Vec<String> = (0..count)
        .map(|i| format!("set_config(${}, ${}, true)", 2 * i + 1, 2 * i + 2))
        .collect();
    format!("SELECT {}", calls.join(", "))
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param.clone() {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::NullUuid => query.bind(None::<uuid::Uuid>),
            SqlParam::Bool(v) => query.bind(v),
            SqlParam::Int(v) => query.bind(v),
            SqlParam::Text(v) => query.bind(v),
            SqlParam::Uuid(v) => query.bind(v),
            SqlParam::Timestamp(v) => query.bind(v),
            SqlParam::Json(v) => query.bind(v),
            SqlParam::UuidArray(v) => query.bind(v),
            SqlParam::TextArray(v) => query.bind(v),
        };
    }
    query
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DataAccessError {
    match err {
        sqlx::Error::Database(db_err) => DataAccessError::Database(match db_err.code() {
            Some(code) => format!("{operation} failed ({code}): {}", db_err.message()),
            None => format!("{operation} failed: {}", db_err.message()),
        }),
        sqlx::Error::PoolClosed => DataAccessError::Database(format!("connection pool closed in {operation}")),
        _ => DataAccessError::Database(format!("sqlx error in {operation}: {err}")),
    }
}
