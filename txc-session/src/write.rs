//! Write engine: the mutation protocol for global and branch session records.
//!
//! The backing store offers no cross-key rollback on partial success, so every multi-key
//! write here is shaped to fail safe: inserts and removals are idempotent pipelines whose
//! worst crash artifact is a zombie index entry, and the status move of a global update runs
//! as an optimistic transaction whose partial outcomes are compensated best effort. The
//! periodic index reconciliation is the actual safety net when compensation loses a race.

use tracing::warn;
use txc_common::error::{StoreError, StoreResult};
use txc_common::ids::StatusCode;
use txc_common::time::unix_time_millis;
use txc_kv::command::{KvCommand, KvReply};
use txc_kv::pool::PooledConn;

use crate::codec;
use crate::keys;
use crate::model::{BranchRecord, GlobalRecord};
use crate::store::SessionStore;

/// Kind of session mutation submitted to [`SessionStore::write_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    GlobalAdd,
    GlobalUpdate,
    GlobalRemove,
    BranchAdd,
    BranchUpdate,
    BranchRemove,
}

/// The record a session mutation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRecord {
    Global(GlobalRecord),
    Branch(BranchRecord),
}

impl SessionRecord {
    fn kind(&self) -> &'static str {
        match self {
            Self::Global(_) => "global",
            Self::Branch(_) => "branch",
        }
    }
}

/// Outcome of the three-command status move, used to drive compensation.
struct MoveOutcome {
    hash_written: bool,
    removed: i64,
    pushed: i64,
}

impl SessionStore {
    /// Applies one session mutation.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` when a global status move was rolled back
    /// after partial application, and an error for invalid pairings, missing prior state on
    /// updates, or backing store failures.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the operation kind does not match the record shape; `NotFound`
    /// when an update targets a record that no longer exists; `Backing` for wire or protocol
    /// failures.
    pub fn write_session(&self, op: WriteOp, record: &SessionRecord) -> StoreResult<bool> {
        match (op, record) {
            (WriteOp::GlobalAdd, SessionRecord::Global(global)) => self.insert_global(global),
            (WriteOp::GlobalUpdate, SessionRecord::Global(global)) => self.update_global(global),
            (WriteOp::GlobalRemove, SessionRecord::Global(global)) => self.remove_global(global),
            (WriteOp::BranchAdd, SessionRecord::Branch(branch)) => self.insert_branch(branch),
            (WriteOp::BranchUpdate, SessionRecord::Branch(branch)) => self.update_branch(branch),
            (WriteOp::BranchRemove, SessionRecord::Branch(branch)) => self.remove_branch(branch),
            (op, record) => Err(StoreError::InvalidArgument(format!(
                "operation {op:?} cannot apply to a {} record",
                record.kind()
            ))),
        }
    }

    /// Writes a new global record and appends its xid to the status index.
    ///
    /// The pipeline is not atomic: a crash between the two commands leaves at worst a global
    /// hash without an index entry, which the reconciliation pass repairs.
    fn insert_global(&self, record: &GlobalRecord) -> StoreResult<bool> {
        let mut record = record.clone();
        let now = unix_time_millis();
        record.gmt_create = now;
        record.gmt_modified = now;

        let mut conn = self.conn();
        let replies = conn.pipeline(&[
            KvCommand::HashSet {
                key: keys::global_key(record.transaction_id),
                fields: codec::encode_global(&record),
            },
            KvCommand::ListPush {
                key: keys::status_key(record.status.code()),
                element: record.xid.clone(),
            },
        ]);
        ensure_no_reply_failure(&replies)?;
        Ok(true)
    }

    /// Removes a global record and its status index entry.
    ///
    /// The caller's status is the source of truth for which index list to clean. A record
    /// already gone counts as success; a peer may have completed the transaction first.
    fn remove_global(&self, record: &GlobalRecord) -> StoreResult<bool> {
        let global_key = keys::global_key(record.transaction_id);
        let mut conn = self.conn();
        let stored_xid = conn.execute(&KvCommand::HashGet {
            key: global_key.clone(),
            field: codec::FIELD_XID.to_owned(),
        });
        match stored_xid {
            KvReply::Value(Some(_)) => {}
            KvReply::Value(None) => {
                warn!(
                    xid = %record.xid,
                    "global transaction already gone; a peer may have removed it"
                );
                return Ok(true);
            }
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("HGET", &other)),
        }

        let replies = conn.pipeline(&[
            KvCommand::ListRemove {
                key: keys::status_key(record.status.code()),
                element: record.xid.clone(),
            },
            KvCommand::Delete { key: global_key },
        ]);
        ensure_no_reply_failure(&replies)?;
        Ok(true)
    }

    /// Moves a global record to a new status, keeping hash and status index consistent from
    /// the perspective of hash readers.
    fn update_global(&self, record: &GlobalRecord) -> StoreResult<bool> {
        let global_key = keys::global_key(record.transaction_id);
        let mut conn = self.conn();

        // Watch first so a concurrent peer invalidates the whole read-modify-write.
        conn.watch(&global_key);
        let reply = conn.execute(&KvCommand::HashMultiGet {
            key: global_key.clone(),
            fields: vec![
                codec::FIELD_STATUS.to_owned(),
                codec::FIELD_GMT_MODIFIED.to_owned(),
            ],
        });
        let mut values = match reply {
            KvReply::Values(values) => values,
            KvReply::Error(message) => {
                conn.unwatch();
                return Err(StoreError::Backing(message));
            }
            other => {
                conn.unwatch();
                return Err(unexpected_reply("HMGET", &other));
            }
        };
        let previous_gmt_modified = values.pop().flatten();
        let Some(previous_status) = values.pop().flatten() else {
            conn.unwatch();
            return Err(StoreError::NotFound(
                "global transaction does not exist, update failed",
            ));
        };
        let new_status = record.status.code().to_string();
        if previous_status == new_status {
            conn.unwatch();
            return Ok(true);
        }
        let previous_code: StatusCode = previous_status.parse().map_err(|_| {
            StoreError::Internal(format!(
                "stored status {previous_status:?} of {} is not an integer code",
                record.xid
            ))
        })?;

        let exec = conn.exec(&[
            KvCommand::HashSet {
                key: global_key.clone(),
                fields: vec![
                    (codec::FIELD_STATUS.to_owned(), new_status),
                    (
                        codec::FIELD_GMT_MODIFIED.to_owned(),
                        unix_time_millis().to_string(),
                    ),
                ],
            },
            KvCommand::ListRemove {
                key: keys::status_key(previous_code),
                element: record.xid.clone(),
            },
            KvCommand::ListPush {
                key: keys::status_key(record.status.code()),
                element: record.xid.clone(),
            },
        ]);
        let Some(replies) = exec else {
            // A peer moved the record first. Some transition happened, which is all the
            // coordinator is owed; report success.
            warn!(
                xid = %record.xid,
                "global transaction changed by another coordinator during update"
            );
            return Ok(true);
        };

        let outcome = MoveOutcome {
            hash_written: matches!(replies.first(), Some(KvReply::Ok)),
            removed: reply_count(replies.get(1)),
            pushed: reply_count(replies.get(2)),
        };
        if outcome.hash_written && outcome.removed > 0 && outcome.pushed > 0 {
            return Ok(true);
        }
        warn!(xid = %record.xid, "status move applied partially; compensating");
        self.compensate_status_move(
            &mut conn,
            record,
            &previous_status,
            previous_gmt_modified.as_deref(),
            previous_code,
            &outcome,
        );
        Ok(false)
    }

    /// Best-effort rollback of a partially applied status move.
    ///
    /// Failures here are logged and swallowed; the reconciliation pass restores the index.
    fn compensate_status_move(
        &self,
        conn: &mut PooledConn,
        record: &GlobalRecord,
        previous_status: &str,
        previous_gmt_modified: Option<&str>,
        previous_code: StatusCode,
        outcome: &MoveOutcome,
    ) {
        if outcome.hash_written {
            let global_key = keys::global_key(record.transaction_id);
            conn.watch(&global_key);
            let stored_xid = conn.execute(&KvCommand::HashGet {
                key: global_key.clone(),
                field: codec::FIELD_XID.to_owned(),
            });
            if matches!(stored_xid, KvReply::Value(Some(_))) {
                let mut fields = vec![(
                    codec::FIELD_STATUS.to_owned(),
                    previous_status.to_owned(),
                )];
                if let Some(gmt_modified) = previous_gmt_modified {
                    fields.push((codec::FIELD_GMT_MODIFIED.to_owned(), gmt_modified.to_owned()));
                }
                let restored = conn.exec(&[KvCommand::HashSet {
                    key: global_key,
                    fields,
                }]);
                if restored.is_none() {
                    warn!(
                        xid = %record.xid,
                        "hash rollback lost to a concurrent peer; leaving repair to reconciliation"
                    );
                }
            } else {
                conn.unwatch();
            }
        }
        if outcome.removed > 0 {
            let reply = conn.execute(&KvCommand::ListPush {
                key: keys::status_key(previous_code),
                element: record.xid.clone(),
            });
            if matches!(reply, KvReply::Error(_)) {
                warn!(xid = %record.xid, "could not restore the previous status index entry");
            }
        }
        if outcome.pushed > 0 {
            let reply = conn.execute(&KvCommand::ListRemove {
                key: keys::status_key(record.status.code()),
                element: record.xid.clone(),
            });
            if matches!(reply, KvReply::Error(_)) {
                warn!(xid = %record.xid, "could not retract the new status index entry");
            }
        }
    }

    /// Writes a new branch record and appends its key to the parent's branch list.
    fn insert_branch(&self, record: &BranchRecord) -> StoreResult<bool> {
        let mut record = record.clone();
        let now = unix_time_millis();
        record.gmt_create = now;
        record.gmt_modified = now;

        let branch_key = keys::branch_key(record.branch_id);
        let mut conn = self.conn();
        let replies = conn.pipeline(&[
            KvCommand::HashSet {
                key: branch_key.clone(),
                fields: codec::encode_branch(&record),
            },
            KvCommand::ListPush {
                key: keys::branch_list_key(&record.xid),
                element: branch_key,
            },
        ]);
        ensure_no_reply_failure(&replies)?;
        Ok(true)
    }

    /// Updates a branch's status, modification time, and optional application data.
    ///
    /// Branches carry no status index, so this is a single-hash write.
    fn update_branch(&self, record: &BranchRecord) -> StoreResult<bool> {
        let branch_key = keys::branch_key(record.branch_id);
        let mut conn = self.conn();
        let previous_status = conn.execute(&KvCommand::HashGet {
            key: branch_key.clone(),
            field: codec::FIELD_STATUS.to_owned(),
        });
        match previous_status {
            KvReply::Value(Some(_)) => {}
            KvReply::Value(None) => {
                return Err(StoreError::NotFound(
                    "branch transaction does not exist, update failed",
                ));
            }
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("HGET", &other)),
        }

        let mut fields = vec![
            (codec::FIELD_STATUS.to_owned(), record.status.to_string()),
            (
                codec::FIELD_GMT_MODIFIED.to_owned(),
                unix_time_millis().to_string(),
            ),
        ];
        if let Some(data) = record
            .application_data
            .as_deref()
            .filter(|data| !data.is_empty())
        {
            fields.push((codec::FIELD_APPLICATION_DATA.to_owned(), data.to_owned()));
        }
        match conn.execute(&KvCommand::HashSet {
            key: branch_key,
            fields,
        }) {
            KvReply::Ok => Ok(true),
            KvReply::Error(message) => Err(StoreError::Backing(message)),
            other => Err(unexpected_reply("HMSET", &other)),
        }
    }

    /// Removes a branch record and its entry in the parent's branch list.
    ///
    /// A branch already gone counts as success.
    fn remove_branch(&self, record: &BranchRecord) -> StoreResult<bool> {
        let branch_key = keys::branch_key(record.branch_id);
        let mut conn = self.conn();
        let stored_xid = conn.execute(&KvCommand::HashGet {
            key: branch_key.clone(),
            field: codec::FIELD_XID.to_owned(),
        });
        match stored_xid {
            KvReply::Value(Some(_)) => {}
            KvReply::Value(None) => return Ok(true),
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("HGET", &other)),
        }

        let replies = conn.pipeline(&[
            KvCommand::ListRemove {
                key: keys::branch_list_key(&record.xid),
                element: branch_key.clone(),
            },
            KvCommand::Delete { key: branch_key },
        ]);
        ensure_no_reply_failure(&replies)?;
        Ok(true)
    }
}

pub(crate) fn ensure_no_reply_failure(replies: &[KvReply]) -> StoreResult<()> {
    for reply in replies {
        if let KvReply::Error(message) = reply {
            return Err(StoreError::Backing(message.clone()));
        }
    }
    Ok(())
}

pub(crate) fn unexpected_reply(operation: &str, reply: &KvReply) -> StoreError {
    StoreError::Internal(format!("unexpected {operation} reply: {reply:?}"))
}

fn reply_count(reply: Option<&KvReply>) -> i64 {
    match reply {
        Some(KvReply::Integer(count)) => *count,
        _ => 0,
    }
}
