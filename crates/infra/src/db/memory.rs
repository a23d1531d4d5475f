//! Recording session backend for tests/dev.
//!
//! Nothing is executed; every call is appended to a shared log so tests can
//! assert what reached the database and in which order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::error::DataAccessError;
use super::session::{validate_savepoint_name, Session, SessionBackend, SessionSetting};
use super::statement::{Statement, StatementKind, StatementOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOp {
    Begin,
    Settings(Vec<SessionSetting>),
    Statement(Statement),
    Savepoint(String),
    ReleaseSavepoint(String),
    RollbackToSavepoint(String),
    Commit,
    Rollback,
}

/// One logged call, tagged with the session (transaction) it ran in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedOp {
    pub session: usize,
    pub op: SessionOp,
}

type Responder = dyn Fn(&Statement) -> Result<StatementOutcome, DataAccessError> + Send + Sync;

#[derive(Clone)]
pub struct RecordingSessionBackend {
    log: Arc<Mutex<Vec<LoggedOp>>>,
    sessions: Arc<AtomicUsize>,
    responder: Arc<Responder>,
}

impl Default for RecordingSessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSessionBackend {
    /// Writes report one affected row; queries return nothing.
    pub fn new() -> Self {
        Self::with_responder(|statement| {
            Ok(match statement.kind {
                StatementKind::Execute => StatementOutcome {
                    rows_affected: 1,
                    rows: Vec::new(),
                },
                StatementKind::Query => StatementOutcome::default(),
            })
        })
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Statement) -> Result<StatementOutcome, DataAccessError> + Send + Sync + 'static,
    {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            sessions: Arc::new(AtomicUsize::new(0)),
            responder: Arc::new(responder),
        }
    }

    pub fn ops(&self) -> Vec<LoggedOp> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Ops without session tags, in log order.
    pub fn plain_ops(&self) -> Vec<SessionOp> {
        self.ops().into_iter().map(|logged| logged.op).collect()
    }

    /// Number of transactions opened so far.
    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl core::fmt::Debug for RecordingSessionBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordingSessionBackend")
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionBackend for RecordingSessionBackend {
    async fn begin(&self) -> Result<Box<dyn Session>, DataAccessError> {
        let id = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let session = RecordingSession {
            id,
            log: self.log.clone(),
            responder: self.responder.clone(),
        };
        session.record(SessionOp::Begin)?;
        Ok(Box::new(session))
    }
}

struct RecordingSession {
    id: usize,
    log: Arc<Mutex<Vec<LoggedOp>>>,
    responder: Arc<Responder>,
}

impl RecordingSession {
    fn record(&self, op: SessionOp) -> Result<(), DataAccessError> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| DataAccessError::Database("recording log poisoned".to_string()))?;
        log.push(LoggedOp { session: self.id, op });
        Ok(())
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn apply_settings(&mut self, settings: &[SessionSetting]) -> Result<(), DataAccessError> {
        self.record(SessionOp::Settings(settings.to_vec()))
    }

    async fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, DataAccessError> {
        self.record(SessionOp::Statement(statement.clone()))?;
        (self.responder)(statement)
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), DataAccessError> {
        validate_savepoint_name(name)?;
        self.record(SessionOp::Savepoint(name.to_string()))
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DataAccessError> {
        self.record(SessionOp::ReleaseSavepoint(name.to_string()))
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DataAccessError> {
        self.record(SessionOp::RollbackToSavepoint(name.to_string()))
    }

    async fn commit(self: Box<Self>) -> Result<(), DataAccessError> {
        self.record(SessionOp::Commit)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DataAccessError> {
        self.record(SessionOp::Rollback)
    }
}
