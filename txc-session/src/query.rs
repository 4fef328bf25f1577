//! Query engine: identity, status, and paged lookups over the session keyspace.
//!
//! Absence is a value on every read path: a vanished global yields `None` or is skipped from
//! list results, and branches whose hash was removed mid-hydration are dropped. Only backing
//! store failures surface as errors.

use txc_common::error::{StoreError, StoreResult};
use txc_common::ids::{TransactionId, xid};
use txc_kv::command::{KvCommand, KvReply};
use txc_kv::containers::HotSet;
use txc_kv::keyspace::ScanCursor;
use txc_kv::pool::PooledConn;

use crate::codec;
use crate::keys;
use crate::model::{BranchRecord, GlobalStatus, SessionAggregate};
use crate::store::SessionStore;
use crate::write::unexpected_reply;

/// Lookup condition union for list-style session reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCondition {
    /// One session by its user-visible id.
    Xid(String),
    /// One session by its embedded transaction id.
    TransactionId(TransactionId),
    /// Every session currently in any of the given statuses, up to the query limit.
    Statuses(Vec<GlobalStatus>),
    /// Every session currently in one status, up to the query limit.
    Status(GlobalStatus),
}

/// Page request for the status-paged console read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPageParam {
    pub status: GlobalStatus,
    /// 1-based page number.
    pub page_num: usize,
    pub page_size: usize,
    pub with_branches: bool,
}

impl SessionStore {
    /// Reads one session by xid.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an xid with no embedded transaction id; `Backing` for store
    /// failures. An absent session is `Ok(None)`.
    pub fn read_session(
        &self,
        xid: &str,
        with_branches: bool,
    ) -> StoreResult<Option<SessionAggregate>> {
        let Some(transaction_id) = xid::transaction_id_of(xid) else {
            return Err(StoreError::InvalidArgument(format!("malformed xid {xid:?}")));
        };
        let mut conn = self.conn();
        self.hydrate_by_key(&mut conn, &keys::global_key(transaction_id), with_branches)
    }

    /// Reads one session by xid, branches included.
    pub fn read_session_full(&self, xid: &str) -> StoreResult<Option<SessionAggregate>> {
        self.read_session(xid, true)
    }

    /// Reads one session directly by transaction id.
    pub fn read_session_by_transaction_id(
        &self,
        transaction_id: TransactionId,
        with_branches: bool,
    ) -> StoreResult<Option<SessionAggregate>> {
        let mut conn = self.conn();
        self.hydrate_by_key(&mut conn, &keys::global_key(transaction_id), with_branches)
    }

    /// Reads every session currently in any of the given statuses.
    ///
    /// Each status list contributes at most `query_limit / statuses.len()` xids (floor one),
    /// in per-status insertion order.
    pub fn read_sessions_by_statuses(
        &self,
        statuses: &[GlobalStatus],
        with_branches: bool,
    ) -> StoreResult<Vec<SessionAggregate>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let per_status = self.effective_query_limit(statuses.len()) as i64;
        let commands = statuses
            .iter()
            .map(|status| KvCommand::ListRange {
                key: keys::status_key(status.code()),
                start: 0,
                stop: per_status - 1,
            })
            .collect::<Vec<_>>();

        let mut conn = self.conn();
        let mut xids = Vec::new();
        for reply in conn.pipeline(&commands) {
            match reply {
                KvReply::Elements(elements) => xids.extend(elements),
                KvReply::Error(message) => return Err(StoreError::Backing(message)),
                other => return Err(unexpected_reply("LRANGE", &other)),
            }
        }
        self.hydrate_xids(&mut conn, &xids, with_branches)
    }

    /// Reads sessions by a condition union: xid, transaction id, status set, or one status.
    pub fn read_sessions(
        &self,
        condition: &SessionCondition,
        with_branches: bool,
    ) -> StoreResult<Vec<SessionAggregate>> {
        match condition {
            SessionCondition::Xid(xid) => {
                Ok(self.read_session(xid, with_branches)?.into_iter().collect())
            }
            SessionCondition::TransactionId(transaction_id) => Ok(self
                .read_session_by_transaction_id(*transaction_id, with_branches)?
                .into_iter()
                .collect()),
            SessionCondition::Statuses(statuses) => {
                self.read_sessions_by_statuses(statuses, with_branches)
            }
            SessionCondition::Status(status) => {
                self.read_sessions_by_statuses(std::slice::from_ref(status), with_branches)
            }
        }
    }

    /// Reads one page of sessions in a status, in index insertion order.
    pub fn read_session_status_by_page(
        &self,
        param: &StatusPageParam,
    ) -> StoreResult<Vec<SessionAggregate>> {
        if param.page_size == 0 {
            return Ok(Vec::new());
        }
        let page_num = param.page_num.max(1);
        let start = ((page_num - 1) * param.page_size) as i64;
        let stop = (page_num * param.page_size) as i64 - 1;

        let mut conn = self.conn();
        let reply = conn.execute(&KvCommand::ListRange {
            key: keys::status_key(param.status.code()),
            start,
            stop,
        });
        let xids = match reply {
            KvReply::Elements(elements) => elements,
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("LRANGE", &other)),
        };
        self.hydrate_xids(&mut conn, &xids, param.with_branches)
    }

    /// Reads one page of all live sessions via a cursor scan of the global keyspace.
    ///
    /// Scan cursors are opaque: the walk always starts at origin and pages by distinct-result
    /// count, skipping `(page_num - 1) * page_size` keys. The scan gives no ordering and may
    /// repeat keys, so results are deduplicated by keyset membership and capped at exactly
    /// `page_size`.
    pub fn find_global_sessions_by_page(
        &self,
        page_num: usize,
        page_size: usize,
        with_branches: bool,
    ) -> StoreResult<Vec<SessionAggregate>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let skip = (page_num.max(1) - 1) * page_size;

        let mut conn = self.conn();
        let mut seen = HotSet::new();
        let mut picked = Vec::new();
        let mut cursor = ScanCursor::Origin;
        loop {
            let (next, batch) = conn.scan(&cursor, keys::GLOBAL_SCAN_PATTERN, page_size);
            for key in batch {
                if !seen.insert(key.clone()) {
                    continue;
                }
                if seen.len() <= skip {
                    continue;
                }
                picked.push(key);
                if picked.len() == page_size {
                    break;
                }
            }
            if picked.len() == page_size || next.is_origin() {
                break;
            }
            cursor = next;
        }

        let mut sessions = Vec::with_capacity(picked.len());
        for key in &picked {
            if let Some(aggregate) = self.hydrate_by_key(&mut conn, key, with_branches)? {
                sessions.push(aggregate);
            }
        }
        Ok(sessions)
    }

    /// Total number of indexed sessions across the given statuses.
    pub fn count_by_global_sessions(&self, statuses: &[GlobalStatus]) -> StoreResult<i64> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let commands = statuses
            .iter()
            .map(|status| KvCommand::ListLen {
                key: keys::status_key(status.code()),
            })
            .collect::<Vec<_>>();

        let mut conn = self.conn();
        let mut total = 0;
        for reply in conn.pipeline(&commands) {
            match reply {
                KvReply::Integer(count) => total += count,
                KvReply::Error(message) => return Err(StoreError::Backing(message)),
                other => return Err(unexpected_reply("LLEN", &other)),
            }
        }
        Ok(total)
    }

    /// Reads the branches registered under an xid, sorted by branch id ascending.
    ///
    /// Empty when the parent has no branches or was removed concurrently.
    pub fn find_branch_sessions_by_xid(&self, xid: &str) -> StoreResult<Vec<BranchRecord>> {
        let mut conn = self.conn();
        self.read_branches(&mut conn, xid)
    }

    fn hydrate_by_key(
        &self,
        conn: &mut PooledConn,
        global_key: &str,
        with_branches: bool,
    ) -> StoreResult<Option<SessionAggregate>> {
        let reply = conn.execute(&KvCommand::HashGetAll {
            key: global_key.to_owned(),
        });
        let pairs = match reply {
            KvReply::Map(pairs) => pairs,
            KvReply::Error(message) => return Err(StoreError::Backing(message)),
            other => return Err(unexpected_reply("HGETALL", &other)),
        };
        if pairs.is_empty() {
            return Ok(None);
        }
        let global = codec::decode_global(&pairs);
        let branches = if with_branches {
            self.read_branches(conn, &global.xid)?
        } else {
            Vec::new()
        };
        Ok(Some(SessionAggregate { global, branches }))
    }

    fn hydrate_xids(
        &self,
        conn: &mut PooledConn,
        xids: &[String],
        with_branches: bool,
    ) -> StoreResult<Vec<SessionAggregate>> {
        let mut sessions = Vec::with_capacity(xids.len());
        for xid_text in xids {
            // Index entries that no longer parse or resolve are stale, not errors.
            let Some(transaction_id) = xid::transaction_id_of(xid_text) else {
                continue;
            };
            if let Some(aggregate) =
                self.hydrate_by_key(conn, &keys::global_key(transaction_id), with_branches)?
            {
                sessions.push(aggregate);
            }
        }
        Ok(sessions)
    }

    pub(crate) fn read_branches(
        &self,
        conn: &mut PooledConn,
        xid: &str,
    ) -> StoreResult<Vec<BranchRecord>> {
        let list_key = keys::branch_list_key(xid);
        let window = self.branch_scan_window() as i64;
        let mut branch_keys: Vec<String> = Vec::new();
        loop {
            let start = branch_keys.len() as i64;
            let reply = conn.execute(&KvCommand::ListRange {
                key: list_key.clone(),
                start,
                stop: start + window - 1,
            });
            let values = match reply {
                KvReply::Elements(elements) => elements,
                KvReply::Error(message) => return Err(StoreError::Backing(message)),
                other => return Err(unexpected_reply("LRANGE", &other)),
            };
            let exhausted = (values.len() as i64) < window;
            branch_keys.extend(values);
            if exhausted {
                break;
            }
        }
        if branch_keys.is_empty() {
            return Ok(Vec::new());
        }

        let commands = branch_keys
            .iter()
            .map(|key| KvCommand::HashGetAll { key: key.clone() })
            .collect::<Vec<_>>();
        let mut branches = Vec::with_capacity(branch_keys.len());
        for reply in conn.pipeline(&commands) {
            match reply {
                // An empty hash means the branch was removed between the list read and now.
                KvReply::Map(pairs) if pairs.is_empty() => {}
                KvReply::Map(pairs) => branches.push(codec::decode_branch(&pairs)),
                KvReply::Error(message) => return Err(StoreError::Backing(message)),
                other => return Err(unexpected_reply("HGETALL", &other)),
            }
        }
        branches.sort_by_key(|branch| branch.branch_id);
        Ok(branches)
    }
}
