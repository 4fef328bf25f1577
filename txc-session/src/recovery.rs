//! Status-index reconciliation.
//!
//! The mutation protocol is best effort across keys: crashes mid-pipeline and lost
//! compensations can leave a global record without an index entry, indexed under a stale
//! status, or indexed more than once. Coordinators run this pass periodically to restore the
//! invariant that every live record is indexed exactly once under exactly its stored status
//! and that no index entry points at a vanished record.

use tracing::{debug, warn};
use txc_common::error::{StoreError, StoreResult};
use txc_common::ids::xid;
use txc_kv::command::{KvCommand, KvReply};
use txc_kv::containers::HotSet;
use txc_kv::keyspace::ScanCursor;
use txc_kv::pool::PooledConn;

use crate::codec;
use crate::keys;
use crate::model::GlobalStatus;
use crate::store::SessionStore;
use crate::write::unexpected_reply;

const SCAN_BATCH: usize = 64;
const REPAIR_RETRIES: usize = 3;

/// Summary of the repairs applied by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Live global records examined.
    pub globals_checked: usize,
    /// Records whose index membership had to be fixed.
    pub memberships_repaired: usize,
    /// Status list entries dropped because their record no longer resolves.
    pub stale_entries_removed: usize,
}

impl SessionStore {
    /// Repairs the status index in two passes: membership of every live record, then pruning
    /// of entries whose record is gone.
    ///
    /// # Errors
    ///
    /// `Conflict` when a membership repair keeps losing its optimistic transaction to
    /// concurrent writers; `Backing` for store failures.
    pub fn reconcile_status_index(&self) -> StoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut conn = self.conn();

        let mut cursor = ScanCursor::Origin;
        loop {
            let (next, batch) = conn.scan(&cursor, keys::GLOBAL_SCAN_PATTERN, SCAN_BATCH);
            for global_key in batch {
                self.repair_record_membership(&mut conn, &global_key, &mut report)?;
            }
            if next.is_origin() {
                break;
            }
            cursor = next;
        }

        for status in GlobalStatus::ALL {
            report.stale_entries_removed += self.prune_status_list(&mut conn, status)?;
        }
        Ok(report)
    }

    /// Ensures one record's xid sits exactly once in exactly its own status list.
    fn repair_record_membership(
        &self,
        conn: &mut PooledConn,
        global_key: &str,
        report: &mut ReconcileReport,
    ) -> StoreResult<()> {
        let reply = conn.execute(&KvCommand::HashGetAll {
            key: global_key.to_owned(),
        });
        let pairs = match reply {
            KvReply::Map(pairs) => pairs,
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("HGETALL", &other)),
        };
        if pairs.is_empty() {
            // Deleted between the scan and this read.
            return Ok(());
        }
        let record = codec::decode_global(&pairs);
        if record.xid.is_empty() {
            return Ok(());
        }
        report.globals_checked += 1;
        let mut repaired = false;

        // Stray memberships under any other status are plain removals; LREM is idempotent.
        let strays = GlobalStatus::ALL
            .into_iter()
            .filter(|status| *status != record.status)
            .map(|status| KvCommand::ListRemove {
                key: keys::status_key(status.code()),
                element: record.xid.clone(),
            })
            .collect::<Vec<_>>();
        for reply in conn.pipeline(&strays) {
            if matches!(reply, KvReply::Integer(count) if count > 0) {
                repaired = true;
            }
        }

        // Exactly-once membership in the record's own list needs the optimistic transaction:
        // counting and rewriting must not interleave with a peer's status move.
        let own_status_key = keys::status_key(record.status.code());
        let mut attempts = 0;
        loop {
            conn.watch(&own_status_key);
            let occurrences = list_occurrences(conn, &own_status_key, &record.xid)?;
            if occurrences == 1 {
                conn.unwatch();
                break;
            }
            let mut commands = Vec::new();
            if occurrences > 1 {
                commands.push(KvCommand::ListRemove {
                    key: own_status_key.clone(),
                    element: record.xid.clone(),
                });
            }
            commands.push(KvCommand::ListPush {
                key: own_status_key.clone(),
                element: record.xid.clone(),
            });
            if conn.exec(&commands).is_some() {
                repaired = true;
                break;
            }
            attempts += 1;
            if attempts == REPAIR_RETRIES {
                return Err(StoreError::Conflict(format!(
                    "status index repair for {} kept losing to concurrent writers",
                    record.xid
                )));
            }
        }

        if repaired {
            report.memberships_repaired += 1;
            debug!(xid = %record.xid, status = record.status.code(), "status index membership repaired");
        }
        Ok(())
    }

    /// Drops entries of one status list whose xid no longer resolves to a record.
    fn prune_status_list(
        &self,
        conn: &mut PooledConn,
        status: GlobalStatus,
    ) -> StoreResult<usize> {
        let status_key = keys::status_key(status.code());
        let reply = conn.execute(&KvCommand::ListRange {
            key: status_key.clone(),
            start: 0,
            stop: -1,
        });
        let entries = match reply {
            KvReply::Elements(elements) => elements,
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("LRANGE", &other)),
        };

        let mut removed = 0;
        let mut checked = HotSet::new();
        for entry in entries {
            if !checked.insert(entry.clone()) {
                continue;
            }
            let resolvable = match xid::transaction_id_of(&entry) {
                None => false,
                Some(transaction_id) => {
                    let stored = conn.execute(&KvCommand::HashGet {
                        key: keys::global_key(transaction_id),
                        field: codec::FIELD_XID.to_owned(),
                    });
                    match stored {
                        KvReply::Value(value) => value.is_some(),
                        KvReply::Error(message) => return Err(StoreError::Backing(message)),
                        other => return Err(unexpected_reply("HGET", &other)),
                    }
                }
            };
            if resolvable {
                continue;
            }
            let dropped = conn.execute(&KvCommand::ListRemove {
                key: status_key.clone(),
                element: entry.clone(),
            });
            if matches!(dropped, KvReply::Integer(count) if count > 0) {
                removed += 1;
                warn!(xid = %entry, status = status.code(), "removed stale status index entry");
            }
        }
        Ok(removed)
    }
}

/// Counts how many times an element occurs in a list.
fn list_occurrences(
    conn: &mut PooledConn,
    key: &str,
    element: &str,
) -> StoreResult<usize> {
    let reply = conn.execute(&KvCommand::ListRange {
        key: key.to_owned(),
        start: 0,
        stop: -1,
    });
    match reply {
        KvReply::Elements(elements) => Ok(elements
            .iter()
            .filter(|candidate| candidate.as_str() == element)
            .count()),
        KvReply::Error(message) => Err(StoreError::Backing(message)),
        other => Err(unexpected_reply("LRANGE", &other)),
    }
}
