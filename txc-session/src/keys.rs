//! Backing-store key layout.
//!
//! The prefixes are fixed wire strings shared with every coordinator peer; downgrade
//! compatibility depends on them, so they must never change.

use txc_common::ids::{BranchId, StatusCode, TransactionId};

/// Prefix of the per-global-transaction hash.
pub const GLOBAL_PREFIX: &str = "global:";

/// Prefix of the per-branch-transaction hash.
pub const BRANCH_PREFIX: &str = "branch:";

/// Prefix of the list of branch keys owned by one xid.
pub const BRANCH_LIST_PREFIX: &str = "branches:";

/// Prefix of the per-status list of live xids.
pub const STATUS_PREFIX: &str = "status:";

/// Scan pattern enumerating every global transaction hash.
pub const GLOBAL_SCAN_PATTERN: &str = "global:*";

/// Key of the hash holding one global record.
#[must_use]
pub fn global_key(transaction_id: TransactionId) -> String {
    format!("{GLOBAL_PREFIX}{transaction_id}")
}

/// Key of the hash holding one branch record.
#[must_use]
pub fn branch_key(branch_id: BranchId) -> String {
    format!("{BRANCH_PREFIX}{branch_id}")
}

/// Key of the list of branch keys registered under an xid, in registration order.
#[must_use]
pub fn branch_list_key(xid: &str) -> String {
    format!("{BRANCH_LIST_PREFIX}{xid}")
}

/// Key of the status index list for one status code.
#[must_use]
pub fn status_key(status_code: StatusCode) -> String {
    format!("{STATUS_PREFIX}{status_code}")
}

#[cfg(test)]
mod tests {
    use super::{branch_key, branch_list_key, global_key, status_key};
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn keys_concatenate_prefix_and_identifier() {
        assert_that!(global_key(10).as_str(), eq("global:10"));
        assert_that!(branch_key(100).as_str(), eq("branch:100"));
        assert_that!(
            branch_list_key("1.1.1.1:8091:10").as_str(),
            eq("branches:1.1.1.1:8091:10")
        );
        assert_that!(status_key(1).as_str(), eq("status:1"));
    }
}
