//! Session record model shared by the write, query, and recovery paths.

use txc_common::ids::{BranchId, EpochMillis, StatusCode, TransactionId};

/// Lifecycle status of a global transaction.
///
/// The integer codes are wire values shared with every coordinator peer and with downgraded
/// deployments; they must never be renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GlobalStatus {
    #[default]
    Unknown = 0,
    Begin = 1,
    Committing = 2,
    CommitRetrying = 3,
    Rollbacking = 4,
    RollbackRetrying = 5,
    TimeoutRollbacking = 6,
    TimeoutRollbackRetrying = 7,
    AsyncCommitting = 8,
    Committed = 9,
    CommitFailed = 10,
    Rollbacked = 11,
    RollbackFailed = 12,
    TimeoutRollbacked = 13,
    TimeoutRollbackFailed = 14,
    Finished = 15,
}

impl GlobalStatus {
    /// Every status in wire-code order, for index sweeps.
    pub const ALL: [Self; 16] = [
        Self::Unknown,
        Self::Begin,
        Self::Committing,
        Self::CommitRetrying,
        Self::Rollbacking,
        Self::RollbackRetrying,
        Self::TimeoutRollbacking,
        Self::TimeoutRollbackRetrying,
        Self::AsyncCommitting,
        Self::Committed,
        Self::CommitFailed,
        Self::Rollbacked,
        Self::RollbackFailed,
        Self::TimeoutRollbacked,
        Self::TimeoutRollbackFailed,
        Self::Finished,
    ];

    /// The stable integer wire code.
    #[must_use]
    pub const fn code(self) -> StatusCode {
        self as StatusCode
    }

    /// Resolves a wire code back to a status.
    #[must_use]
    pub fn from_code(code: StatusCode) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == code)
    }
}

/// Protocol family of a branch transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BranchType {
    #[default]
    At = 0,
    Tcc = 1,
    Saga = 2,
    Xa = 3,
}

impl BranchType {
    /// The stable integer wire code.
    #[must_use]
    pub const fn code(self) -> StatusCode {
        self as StatusCode
    }

    /// Resolves a wire code back to a branch type.
    #[must_use]
    pub fn from_code(code: StatusCode) -> Option<Self> {
        match code {
            0 => Some(Self::At),
            1 => Some(Self::Tcc),
            2 => Some(Self::Saga),
            3 => Some(Self::Xa),
            _ => None,
        }
    }
}

/// One global transaction record.
///
/// `gmt_create` is stamped once at insert; `gmt_modified` moves on every successful mutation.
/// Both are maintained by the store, never by callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalRecord {
    /// User-visible globally unique id, `<ip>:<port>:<transactionId>`.
    pub xid: String,
    /// The transaction id embedded in the xid.
    pub transaction_id: TransactionId,
    pub status: GlobalStatus,
    pub application_id: String,
    pub service_group: String,
    pub tx_name: String,
    /// Transaction timeout in milliseconds.
    pub timeout: i32,
    /// Begin time in epoch milliseconds, immutable after insert.
    pub begin_time: EpochMillis,
    /// Opaque caller payload; omitted from the wire when absent.
    pub application_data: Option<String>,
    pub gmt_create: EpochMillis,
    pub gmt_modified: EpochMillis,
}

/// One branch transaction record, owned by its parent xid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchRecord {
    /// Globally unique branch id.
    pub branch_id: BranchId,
    /// Parent global transaction reference.
    pub xid: String,
    pub resource_group_id: String,
    pub resource_id: String,
    pub client_id: String,
    pub branch_type: BranchType,
    /// Branch status wire code.
    pub status: StatusCode,
    /// Opaque caller payload; omitted from the wire when absent.
    pub application_data: Option<String>,
    pub gmt_create: EpochMillis,
    pub gmt_modified: EpochMillis,
}

/// A global record together with its (optionally hydrated) branches, sorted by branch id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAggregate {
    pub global: GlobalRecord,
    pub branches: Vec<BranchRecord>,
}
