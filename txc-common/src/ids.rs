//! Canonical identifier types used across the store, query, and recovery paths.

/// 64-bit id of a global transaction, unique within one coordinator cluster.
pub type TransactionId = i64;

/// 64-bit id of a branch transaction, unique across all branches.
pub type BranchId = i64;

/// Integer wire code of a transaction status.
pub type StatusCode = i32;

/// Milliseconds since the unix epoch, the store's timestamp unit.
pub type EpochMillis = i64;

/// Helpers for the user-visible global transaction id.
///
/// An xid is `<ip>:<port>:<transactionId>`; the embedded transaction id sits after the last
/// colon so IPv6-style hosts with embedded colons still parse.
pub mod xid {
    use super::TransactionId;

    /// Extracts the transaction id embedded in an xid.
    ///
    /// Returns `None` when the xid carries no colon or the tail is not a base-10 integer.
    #[must_use]
    pub fn transaction_id_of(xid: &str) -> Option<TransactionId> {
        let (_, tail) = xid.rsplit_once(':')?;
        tail.parse().ok()
    }

    /// Composes an xid from a coordinator address and a local transaction id.
    #[must_use]
    pub fn compose(host: &str, port: u16, transaction_id: TransactionId) -> String {
        format!("{host}:{port}:{transaction_id}")
    }
}
