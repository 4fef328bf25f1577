//! Transaction session store of a distributed transaction coordinator.
//!
//! The coordinator arbitrates global transactions spanning multiple resource managers; this
//! crate persists their session state (one global record plus its ordered branch records) into
//! a keyed backing store, maintains a per-status index of live xids under concurrent
//! coordinator peers, and serves the identity, status, and paged lookups the coordinator's
//! recovery loops and administrative console depend on.
//!
//! The backing store offers only per-key serialization, non-atomic pipelines, and optimistic
//! watch/exec transactions, so multi-key writes are compensated on partial failure and a
//! reconciliation pass restores the status index when compensation loses a race.

pub mod codec;
pub mod keys;
pub mod model;
pub mod query;
pub mod recovery;
pub mod store;
pub mod write;

pub use model::{BranchRecord, BranchType, GlobalRecord, GlobalStatus, SessionAggregate};
pub use query::{SessionCondition, StatusPageParam};
pub use recovery::ReconcileReport;
pub use store::SessionStore;
pub use write::{SessionRecord, WriteOp};
