//! Statement/transaction interceptor.
//!
//! Every statement passes through a statically composed chain of
//! [`StatementStage`]s before it reaches the session:
//!
//! `PolicyInjection -> EventEmission -> SessionExecutor`
//!
//! Policy injection runs for each statement, including every statement
//! inside an explicit transaction, so the session never executes anything
//! without current policy inputs (or an audited bypass) applied in the same
//! transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::DataAccessError;
use super::events::{DataChangeEvent, DataChangeSink};
use super::policy::PolicyBuilder;
use super::session::{Session, SessionBackend};
use super::statement::{Statement, StatementOutcome, WriteTarget};
use crate::context;

#[derive(Debug, Default)]
pub struct StageOutput {
    pub outcome: StatementOutcome,
    /// Change events to publish once the enclosing transaction commits.
    pub events: Vec<DataChangeEvent>,
}

#[async_trait]
pub trait StatementStage: Send + Sync {
    async fn execute(&self, session: &mut dyn Session, statement: Statement) -> Result<StageOutput, DataAccessError>;

    /// Called at the start of a nested scope (savepoint).
    async fn on_scope_start(&self, _session: &mut dyn Session) -> Result<(), DataAccessError> {
        Ok(())
    }
}

/// Applies the current data-access policy before handing the statement on.
#[derive(Debug, Clone)]
pub struct PolicyInjection<N> {
    policies: PolicyBuilder,
    next: N,
}

impl<N> PolicyInjection<N> {
    pub fn new(policies: PolicyBuilder, next: N) -> Self {
        Self { policies, next }
    }
}

#[async_trait]
impl<N: StatementStage> StatementStage for PolicyInjection<N> {
    async fn execute(
        &self,
        session: &mut dyn Session,
        mut statement: Statement,
    ) -> Result<StageOutput, DataAccessError> {
        let policy = self.policies.current().await?;
        session.apply_settings(&policy.settings()).await?;

        if let Some(client_id) = policy.client_id() {
            if statement.stamp_owner_client(client_id) {
                debug!(
                    resource = statement.target.map(|t| t.resource.as_str()),
                    client_id = %client_id,
                    "stamped owner client on write"
                );
            }
        }

        self.next.execute(session, statement).await
    }

    async fn on_scope_start(&self, session: &mut dyn Session) -> Result<(), DataAccessError> {
        let policy = self.policies.current().await?;
        session.apply_settings(&policy.settings()).await?;
        self.next.on_scope_start(session).await
    }
}

/// Records a [`DataChangeEvent`] for every write that touched rows.
#[derive(Debug, Clone, Default)]
pub struct EventEmission<N> {
    next: N,
}

impl<N> EventEmission<N> {
    pub fn new(next: N) -> Self {
        Self { next }
    }
}

#[async_trait]
impl<N: StatementStage> StatementStage for EventEmission<N> {
    async fn execute(&self, session: &mut dyn Session, statement: Statement) -> Result<StageOutput, DataAccessError> {
        let target = statement.target;
        let mut output = self.next.execute(session, statement).await?;

        if let Some(target) = target {
            if output.outcome.rows_affected > 0 {
                output.events.push(change_event(target, output.outcome.rows_affected));
            }
        }
        Ok(output)
    }

    async fn on_scope_start(&self, session: &mut dyn Session) -> Result<(), DataAccessError> {
        self.next.on_scope_start(session).await
    }
}

fn change_event(target: WriteTarget, rows_affected: u64) -> DataChangeEvent {
    let ctx = context::current();
    let grant = ctx.as_ref().and_then(|c| c.grant());
    DataChangeEvent {
        event_id: Uuid::now_v7(),
        resource: target.resource,
        op: target.op,
        client_id: grant.and_then(|g| g.client_id),
        site_id: grant.and_then(|g| g.site_id),
        actor: ctx.as_ref().and_then(|c| c.principal()).map(|p| p.idp_id().clone()),
        request_id: ctx.as_ref().and_then(|c| c.metadata().request_id),
        rows_affected,
        occurred_at: Utc::now(),
    }
}

/// Terminal stage: runs the statement on the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionExecutor;

#[async_trait]
impl StatementStage for SessionExecutor {
    async fn execute(&self, session: &mut dyn Session, statement: Statement) -> Result<StageOutput, DataAccessError> {
        let outcome = session.execute(&statement).await?;
        Ok(StageOutput {
            outcome,
            events: Vec::new(),
        })
    }
}

pub type DefaultChain = PolicyInjection<EventEmission<SessionExecutor>>;

/// Entry point for all tenant-data access.
pub struct ScopedDatabase<C = DefaultChain> {
    backend: Arc<dyn SessionBackend>,
    chain: Arc<C>,
    sink: Arc<dyn DataChangeSink>,
}

impl<C> Clone for ScopedDatabase<C> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            chain: self.chain.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl ScopedDatabase<DefaultChain> {
    pub fn new(backend: Arc<dyn SessionBackend>, policies: PolicyBuilder, sink: Arc<dyn DataChangeSink>) -> Self {
        let chain = PolicyInjection::new(policies, EventEmission::new(SessionExecutor));
        Self::with_chain(backend, chain, sink)
    }
}

impl<C: StatementStage> ScopedDatabase<C> {
    pub fn with_chain(backend: Arc<dyn SessionBackend>, chain: C, sink: Arc<dyn DataChangeSink>) -> Self {
        Self {
            backend,
            chain: Arc::new(chain),
            sink,
        }
    }

    /// Run one statement in its own transaction.
    pub async fn execute(&self, statement: Statement) -> Result<StatementOutcome, DataAccessError> {
        let mut tx = self.begin().await?;
        match tx.execute(statement).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed statement also failed");
                }
                Err(e)
            }
        }
    }

    pub async fn begin(&self) -> Result<ScopedTransaction<C>, DataAccessError> {
        let session = self.backend.begin().await?;
        Ok(ScopedTransaction {
            session,
            chain: self.chain.clone(),
            sink: self.sink.clone(),
            pending: Vec::new(),
            savepoints: 0,
        })
    }
}

/// An open transaction. Dropping it without [`commit`](Self::commit) leaves
/// the rollback to the backend.
pub struct ScopedTransaction<C = DefaultChain> {
    session: Box<dyn Session>,
    chain: Arc<C>,
    sink: Arc<dyn DataChangeSink>,
    pending: Vec<DataChangeEvent>,
    savepoints: u32,
}

impl<C: StatementStage> ScopedTransaction<C> {
    pub async fn execute(&mut self, statement: Statement) -> Result<StatementOutcome, DataAccessError> {
        let output = self.chain.execute(self.session.as_mut(), statement).await?;
        self.pending.extend(output.events);
        Ok(output.outcome)
    }

    /// Open a nested scope backed by a savepoint.
    pub async fn nested(&mut self) -> Result<NestedTransaction<'_, C>, DataAccessError> {
        self.savepoints += 1;
        let name = format!("inspectra_sp_{}", self.savepoints);
        self.session.savepoint(&name).await?;
        self.chain.on_scope_start(self.session.as_mut()).await?;
        let mark = self.pending.len();
        Ok(NestedTransaction { tx: self, name, mark })
    }

    /// Commit, then publish the change events collected along the way.
    pub async fn commit(self) -> Result<(), DataAccessError> {
        self.session.commit().await?;
        for event in self.pending {
            self.sink.emit(event);
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DataAccessError> {
        self.session.rollback().await
    }
}

/// A savepoint scope inside a [`ScopedTransaction`].
///
/// Policy inputs are re-applied when the scope opens. Dropping it without
/// [`release`](Self::release) or [`rollback`](Self::rollback) keeps its work
/// as part of the parent.
pub struct NestedTransaction<'a, C = DefaultChain> {
    tx: &'a mut ScopedTransaction<C>,
    name: String,
    mark: usize,
}

impl<C: StatementStage> NestedTransaction<'_, C> {
    pub fn savepoint_name(&self) -> &str {
        &self.name
    }

    pub async fn execute(&mut self, statement: Statement) -> Result<StatementOutcome, DataAccessError> {
        self.tx.execute(statement).await
    }

    pub async fn nested(&mut self) -> Result<NestedTransaction<'_, C>, DataAccessError> {
        self.tx.nested().await
    }

    pub async fn release(self) -> Result<(), DataAccessError> {
        self.tx.session.release_savepoint(&self.name).await
    }

    /// Undo everything since the scope opened, including its pending events.
    pub async fn rollback(self) -> Result<(), DataAccessError> {
        self.tx.session.rollback_to_savepoint(&self.name).await?;
        self.tx.pending.truncate(self.mark);
        self.tx.session.release_savepoint(&self.name).await
    }
}
