//! Tenant-scoped data access: policy inputs, sessions and the interceptor chain.

pub mod error;
pub mod events;
pub mod interceptor;
pub mod memory;
pub mod policy;
pub mod postgres;
pub mod session;
pub mod statement;

pub use error::DataAccessError;
pub use events::{BroadcastDataChangeSink, DataChangeEvent, DataChangeSink, NoopDataChangeSink};
pub use interceptor::{
    DefaultChain, EventEmission, NestedTransaction, PolicyInjection, ScopedDatabase, ScopedTransaction,
    SessionExecutor, StageOutput, StatementStage,
};
pub use memory::{LoggedOp, RecordingSessionBackend, SessionOp};
pub use policy::{DataAccessPolicy, PolicyBuilder, PolicyInputs};
pub use postgres::PgSessionBackend;
pub use session::{Session, SessionBackend, SessionSetting};
pub use statement::{ResourceKind, SqlParam, Statement, StatementKind, StatementOutcome, WriteOp, WriteTarget};
