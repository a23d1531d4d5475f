//! Backend-neutral statements flowing through the interceptor chain.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use inspectra_core::{ClientId, SiteId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    /// Untyped NULL, bound as text.
    Null,
    /// NULL for a uuid column.
    NullUuid,
    Bool(bool),
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
    UuidArray(Vec<Uuid>),
    TextArray(Vec<String>),
}

impl SqlParam {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlParam::Null | SqlParam::NullUuid)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<Uuid> for SqlParam {
    fn from(value: Uuid) -> Self {
        SqlParam::Uuid(value)
    }
}

impl From<ClientId> for SqlParam {
    fn from(value: ClientId) -> Self {
        SqlParam::Uuid(value.into())
    }
}

impl From<SiteId> for SqlParam {
    fn from(value: SiteId) -> Self {
        SqlParam::Uuid(value.into())
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(value: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(value)
    }
}

impl From<JsonValue> for SqlParam {
    fn from(value: JsonValue) -> Self {
        SqlParam::Json(value)
    }
}

impl From<Option<Uuid>> for SqlParam {
    fn from(value: Option<Uuid>) -> Self {
        value.map(SqlParam::Uuid).unwrap_or(SqlParam::NullUuid)
    }
}

impl From<Option<ClientId>> for SqlParam {
    fn from(value: Option<ClientId>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::NullUuid)
    }
}

impl From<Option<SiteId>> for SqlParam {
    fn from(value: Option<SiteId>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::NullUuid)
    }
}

impl From<Option<String>> for SqlParam {
    fn from(value: Option<String>) -> Self {
        value.map(SqlParam::Text).unwrap_or(SqlParam::Null)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Returns rows.
    Query,
    /// Returns an affected-row count only.
    Execute,
}

/// Tenant-scoped resource families the engine knows about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Asset,
    Inspection,
    InspectionTemplate,
    Category,
    Product,
    CustomQuestion,
    Site,
    Client,
    Membership,
}

impl ResourceKind {
    /// Resources that may be global (no owning client) but must never become
    /// global through a user-scoped write.
    pub fn stamps_owner_client(self) -> bool {
        matches!(self, ResourceKind::Category | ResourceKind::Product | ResourceKind::CustomQuestion)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Asset => "asset",
            ResourceKind::Inspection => "inspection",
            ResourceKind::InspectionTemplate => "inspection_template",
            ResourceKind::Category => "category",
            ResourceKind::Product => "product",
            ResourceKind::CustomQuestion => "custom_question",
            ResourceKind::Site => "site",
            ResourceKind::Client => "client",
            ResourceKind::Membership => "membership",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    pub resource: ResourceKind,
    pub op: WriteOp,
    /// Zero-based index of the owner-client parameter, if the statement has one.
    pub owner_param: Option<usize>,
}

/// One SQL statement plus what the interceptor needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub kind: StatementKind,
    pub target: Option<WriteTarget>,
}

impl Statement {
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: StatementKind::Query,
            target: None,
        }
    }

    pub fn execute(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: StatementKind::Execute,
            target: None,
        }
    }

    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Mark this statement as a write against `resource`.
    pub fn writes(mut self, resource: ResourceKind, op: WriteOp) -> Self {
        self.target = Some(WriteTarget {
            resource,
            op,
            owner_param: None,
        });
        self
    }

    /// Point at the parameter holding the owning client id.
    pub fn owner_client_param(mut self, index: usize) -> Self {
        if let Some(target) = self.target.as_mut() {
            target.owner_param = Some(index);
        }
        self
    }

    pub fn is_write(&self) -> bool {
        self.target.is_some()
    }

    /// Fill a NULL owner-client parameter with `client_id`.
    ///
    /// Returns true when the statement was changed. Only resources that
    /// [`stamp their owner`](ResourceKind::stamps_owner_client) are touched.
    pub fn stamp_owner_client(&mut self, client_id: ClientId) -> bool {
        let Some(WriteTarget {
            resource,
            owner_param: Some(index),
            ..
        }) = self.target
        else {
            return false;
        };
        if !resource.stamps_owner_client() {
            return false;
        }
        match self.params.get_mut(index) {
            Some(param) if param.is_null() => {
                *param = SqlParam::from(client_id);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    pub rows_affected: u64,
    /// One JSON object per returned row.
    pub rows: Vec<JsonValue>,
}
