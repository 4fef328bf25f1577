//! In-memory versioned keyspace with Redis-compatible hash/list semantics.
//!
//! Every successful mutation bumps a per-key version counter. Optimistic transactions record
//! the version of each watched key and abort when any of them moved, which is the only
//! concurrency primitive the backing store owes its callers.

use crate::command::{KvCommand, KvReply};
use crate::containers::HotMap;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredValue {
    Hash(HotMap<String, String>),
    List(Vec<String>),
}

/// Opaque resume point for [`Keyspace::scan`].
///
/// `Origin` both starts a scan and, when returned, marks it exhausted. A mid-scan cursor
/// carries the last key handed out rather than a position, so keys removed behind the cursor
/// cannot shift still-unvisited keys out of the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCursor {
    Origin,
    After(String),
}

impl ScanCursor {
    /// Whether this cursor is the origin (scan not yet started, or exhausted).
    #[must_use]
    pub fn is_origin(&self) -> bool {
        matches!(self, Self::Origin)
    }
}

/// The shared keyspace: one flat map of keys to hash or list entries.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HotMap<String, StoredValue>,
    versions: HotMap<String, u64>,
}

impl Keyspace {
    /// Creates an empty keyspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of a key. Keys never written report version zero.
    ///
    /// Versions survive deletion, so a watcher of a deleted key still observes the change.
    #[must_use]
    pub fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump_version(&mut self, key: &str) {
        *self.versions.entry_ref(key).or_insert(0) += 1;
    }

    /// Applies one command and returns its reply.
    pub fn apply(&mut self, command: &KvCommand) -> KvReply {
        match command {
            KvCommand::HashSet { key, fields } => self.hash_set(key, fields),
            KvCommand::HashGet { key, field } => self.hash_get(key, field),
            KvCommand::HashMultiGet { key, fields } => self.hash_multi_get(key, fields),
            KvCommand::HashGetAll { key } => self.hash_get_all(key),
            KvCommand::ListPush { key, element } => self.list_push(key, element),
            KvCommand::ListRemove { key, element } => self.list_remove(key, element),
            KvCommand::ListRange { key, start, stop } => self.list_range(key, *start, *stop),
            KvCommand::ListLen { key } => self.list_len(key),
            KvCommand::Delete { key } => self.delete(key),
        }
    }

    fn hash_set(&mut self, key: &str, fields: &[(String, String)]) -> KvReply {
        let entry = self
            .entries
            .entry_ref(key)
            .or_insert_with(|| StoredValue::Hash(HotMap::new()));
        let StoredValue::Hash(map) = entry else {
            return KvReply::Error(WRONG_TYPE.to_owned());
        };
        for (field, value) in fields {
            map.insert(field.clone(), value.clone());
        }
        self.bump_version(key);
        KvReply::Ok
    }

    fn hash_get(&self, key: &str, field: &str) -> KvReply {
        match self.entries.get(key) {
            None => KvReply::Value(None),
            Some(StoredValue::Hash(map)) => KvReply::Value(map.get(field).cloned()),
            Some(StoredValue::List(_)) => KvReply::Error(WRONG_TYPE.to_owned()),
        }
    }

    fn hash_multi_get(&self, key: &str, fields: &[String]) -> KvReply {
        match self.entries.get(key) {
            None => KvReply::Values(vec![None; fields.len()]),
            Some(StoredValue::Hash(map)) => KvReply::Values(
                fields
                    .iter()
                    .map(|field| map.get(field).cloned())
                    .collect(),
            ),
            Some(StoredValue::List(_)) => KvReply::Error(WRONG_TYPE.to_owned()),
        }
    }

    fn hash_get_all(&self, key: &str) -> KvReply {
        match self.entries.get(key) {
            None => KvReply::Map(Vec::new()),
            Some(StoredValue::Hash(map)) => {
                let mut pairs = map
                    .iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect::<Vec<_>>();
                pairs.sort_unstable_by(|left, right| left.0.cmp(&right.0));
                KvReply::Map(pairs)
            }
            Some(StoredValue::List(_)) => KvReply::Error(WRONG_TYPE.to_owned()),
        }
    }

    fn list_push(&mut self, key: &str, element: &str) -> KvReply {
        let entry = self
            .entries
            .entry_ref(key)
            .or_insert_with(|| StoredValue::List(Vec::new()));
        let StoredValue::List(elements) = entry else {
            return KvReply::Error(WRONG_TYPE.to_owned());
        };
        elements.push(element.to_owned());
        let length = elements.len() as i64;
        self.bump_version(key);
        KvReply::Integer(length)
    }

    fn list_remove(&mut self, key: &str, element: &str) -> KvReply {
        let Some(entry) = self.entries.get_mut(key) else {
            return KvReply::Integer(0);
        };
        let StoredValue::List(elements) = entry else {
            return KvReply::Error(WRONG_TYPE.to_owned());
        };
        let before = elements.len();
        elements.retain(|candidate| candidate != element);
        let removed = before - elements.len();
        if removed == 0 {
            return KvReply::Integer(0);
        }
        let now_empty = elements.is_empty();
        self.bump_version(key);
        if now_empty {
            self.entries.remove(key);
        }
        KvReply::Integer(removed as i64)
    }

    fn list_range(&self, key: &str, start: i64, stop: i64) -> KvReply {
        match self.entries.get(key) {
            None => KvReply::Elements(Vec::new()),
            Some(StoredValue::List(elements)) => {
                let Some((from, to)) = normalized_range(elements.len(), start, stop) else {
                    return KvReply::Elements(Vec::new());
                };
                KvReply::Elements(elements[from..=to].to_vec())
            }
            Some(StoredValue::Hash(_)) => KvReply::Error(WRONG_TYPE.to_owned()),
        }
    }

    fn list_len(&self, key: &str) -> KvReply {
        match self.entries.get(key) {
            None => KvReply::Integer(0),
            Some(StoredValue::List(elements)) => KvReply::Integer(elements.len() as i64),
            Some(StoredValue::Hash(_)) => KvReply::Error(WRONG_TYPE.to_owned()),
        }
    }

    fn delete(&mut self, key: &str) -> KvReply {
        if self.entries.remove(key).is_none() {
            return KvReply::Integer(0);
        }
        self.bump_version(key);
        KvReply::Integer(1)
    }

    /// Cursor-based enumeration of keys matching a pattern.
    ///
    /// [`ScanCursor::Origin`] starts a scan; a returned origin cursor means the scan is
    /// exhausted. Each step walks the sorted current keys strictly after the cursor's last
    /// returned key, so every key present for the whole scan is reported even when keys behind
    /// the cursor are deleted concurrently; keys inserted or removed mid-scan may be missed,
    /// matching the weak guarantees of the wire-level SCAN primitive.
    #[must_use]
    pub fn scan(&self, cursor: &ScanCursor, pattern: &str, count: usize) -> (ScanCursor, Vec<String>) {
        let mut matching = self
            .entries
            .keys()
            .filter(|key| key_matches(key, pattern))
            .collect::<Vec<_>>();
        matching.sort_unstable();

        let from = match cursor {
            ScanCursor::Origin => 0,
            ScanCursor::After(last) => {
                matching.partition_point(|key| key.as_str() <= last.as_str())
            }
        };
        if from >= matching.len() {
            return (ScanCursor::Origin, Vec::new());
        }
        let to = matching.len().min(from + count.max(1));
        let batch = matching[from..to]
            .iter()
            .map(|key| (*key).clone())
            .collect();
        let next = if to >= matching.len() {
            ScanCursor::Origin
        } else {
            ScanCursor::After(matching[to - 1].clone())
        };
        (next, batch)
    }
}

/// Clamps an inclusive Redis-style range onto a list of `len` elements.
///
/// Negative indices count from the tail. Returns `None` when the window is empty.
fn normalized_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let from = if start < 0 { (len + start).max(0) } else { start };
    let to = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if from > to || from >= len || to < 0 {
        return None;
    }
    Some((from as usize, to as usize))
}

/// Matches a key against the supported pattern forms: a literal key, or a fixed prefix followed
/// by a trailing `*`.
fn key_matches(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::{Keyspace, ScanCursor, normalized_range};
    use crate::command::{KvCommand, KvReply};
    use googletest::prelude::*;
    use rstest::rstest;

    fn hash_set(key: &str, fields: &[(&str, &str)]) -> KvCommand {
        KvCommand::HashSet {
            key: key.to_owned(),
            fields: fields
                .iter()
                .map(|(field, value)| ((*field).to_owned(), (*value).to_owned()))
                .collect(),
        }
    }

    fn push(key: &str, element: &str) -> KvCommand {
        KvCommand::ListPush {
            key: key.to_owned(),
            element: element.to_owned(),
        }
    }

    #[rstest]
    fn hash_write_then_read_returns_sorted_fields() {
        let mut keyspace = Keyspace::new();
        let reply = keyspace.apply(&hash_set("g:1", &[("xid", "x"), ("status", "1")]));
        assert_that!(reply, eq(&KvReply::Ok));

        let all = keyspace.apply(&KvCommand::HashGetAll {
            key: "g:1".to_owned(),
        });
        assert_that!(
            all,
            eq(&KvReply::Map(vec![
                ("status".to_owned(), "1".to_owned()),
                ("xid".to_owned(), "x".to_owned()),
            ]))
        );
    }

    #[rstest]
    fn hash_multi_get_preserves_request_order_and_gaps() {
        let mut keyspace = Keyspace::new();
        let _ = keyspace.apply(&hash_set("g:1", &[("status", "2")]));

        let reply = keyspace.apply(&KvCommand::HashMultiGet {
            key: "g:1".to_owned(),
            fields: vec!["missing".to_owned(), "status".to_owned()],
        });
        assert_that!(
            reply,
            eq(&KvReply::Values(vec![None, Some("2".to_owned())]))
        );
    }

    #[rstest]
    fn list_push_reports_length_and_remove_drops_all_occurrences() {
        let mut keyspace = Keyspace::new();
        assert_that!(keyspace.apply(&push("s:1", "a")), eq(&KvReply::Integer(1)));
        assert_that!(keyspace.apply(&push("s:1", "b")), eq(&KvReply::Integer(2)));
        assert_that!(keyspace.apply(&push("s:1", "a")), eq(&KvReply::Integer(3)));

        let removed = keyspace.apply(&KvCommand::ListRemove {
            key: "s:1".to_owned(),
            element: "a".to_owned(),
        });
        assert_that!(removed, eq(&KvReply::Integer(2)));

        let range = keyspace.apply(&KvCommand::ListRange {
            key: "s:1".to_owned(),
            start: 0,
            stop: -1,
        });
        assert_that!(range, eq(&KvReply::Elements(vec!["b".to_owned()])));
    }

    #[rstest]
    fn emptied_list_key_disappears_but_keeps_its_version() {
        let mut keyspace = Keyspace::new();
        let _ = keyspace.apply(&push("s:1", "a"));
        let version_before = keyspace.version("s:1");

        let _ = keyspace.apply(&KvCommand::ListRemove {
            key: "s:1".to_owned(),
            element: "a".to_owned(),
        });
        assert_that!(
            keyspace.apply(&KvCommand::ListLen {
                key: "s:1".to_owned()
            }),
            eq(&KvReply::Integer(0))
        );
        assert_that!(keyspace.version("s:1") > version_before, eq(true));
    }

    #[rstest]
    fn type_clash_reports_wrongtype_without_bumping_versions() {
        let mut keyspace = Keyspace::new();
        let _ = keyspace.apply(&push("s:1", "a"));
        let version = keyspace.version("s:1");

        let reply = keyspace.apply(&hash_set("s:1", &[("field", "value")]));
        assert_that!(matches!(reply, KvReply::Error(_)), eq(true));
        assert_that!(keyspace.version("s:1"), eq(version));
    }

    #[rstest]
    fn every_mutation_bumps_the_key_version() {
        let mut keyspace = Keyspace::new();
        assert_that!(keyspace.version("g:1"), eq(0_u64));

        let _ = keyspace.apply(&hash_set("g:1", &[("xid", "x")]));
        assert_that!(keyspace.version("g:1"), eq(1_u64));

        let _ = keyspace.apply(&KvCommand::Delete {
            key: "g:1".to_owned(),
        });
        assert_that!(keyspace.version("g:1"), eq(2_u64));
    }

    #[rstest]
    #[case(0, 9, Some((0, 9)))]
    #[case(-3, -1, Some((7, 9)))]
    #[case(5, 100, Some((5, 9)))]
    #[case(7, 3, None)]
    #[case(12, 20, None)]
    fn range_normalization_handles_negative_and_overflowing_bounds(
        #[case] start: i64,
        #[case] stop: i64,
        #[case] expected: Option<(usize, usize)>,
    ) {
        assert_that!(normalized_range(10, start, stop), eq(expected));
    }

    #[rstest]
    fn scan_pages_through_sorted_matches_and_terminates_at_origin() {
        let mut keyspace = Keyspace::new();
        for id in 0..5 {
            let _ = keyspace.apply(&hash_set(&format!("global:{id}"), &[("xid", "x")]));
        }
        let _ = keyspace.apply(&hash_set("branch:9", &[("xid", "x")]));

        let mut collected = Vec::new();
        let mut cursor = ScanCursor::Origin;
        loop {
            let (next, batch) = keyspace.scan(&cursor, "global:*", 2);
            collected.extend(batch);
            if next.is_origin() {
                break;
            }
            cursor = next;
        }
        assert_that!(collected.len(), eq(5_usize));
        assert_that!(collected.iter().all(|key| key.starts_with("global:")), eq(true));
    }

    #[rstest]
    fn scan_does_not_skip_keys_when_one_is_deleted_behind_the_cursor() {
        let mut keyspace = Keyspace::new();
        for id in 1..=5 {
            let _ = keyspace.apply(&hash_set(&format!("global:{id}"), &[("xid", "x")]));
        }

        let (mut cursor, first_batch) = keyspace.scan(&ScanCursor::Origin, "global:*", 2);
        assert_that!(
            first_batch,
            eq(&vec!["global:1".to_owned(), "global:2".to_owned()])
        );

        // A concurrent removal behind the cursor must not shift unvisited keys out of view.
        let _ = keyspace.apply(&KvCommand::Delete {
            key: "global:2".to_owned(),
        });

        let mut collected = first_batch;
        loop {
            let (next, batch) = keyspace.scan(&cursor, "global:*", 2);
            collected.extend(batch);
            if next.is_origin() {
                break;
            }
            cursor = next;
        }
        assert_that!(
            collected,
            eq(&vec![
                "global:1".to_owned(),
                "global:2".to_owned(),
                "global:3".to_owned(),
                "global:4".to_owned(),
                "global:5".to_owned(),
            ])
        );
    }
}
