//! Typed command and reply vocabulary for the keyed store.
//!
//! The set is limited to the hash, list, and key operations the session store issues. Dispatch
//! is an exhaustive `match` over a tagged union; there is no string-keyed command table and no
//! reflection anywhere on the write path.

/// One keyed-store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    /// Writes (creating or overwriting) the given fields of a hash.
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Reads one field of a hash.
    HashGet { key: String, field: String },
    /// Reads several fields of a hash, preserving request order.
    HashMultiGet { key: String, fields: Vec<String> },
    /// Reads the full field map of a hash.
    HashGetAll { key: String },
    /// Appends one element to the tail of a list.
    ListPush { key: String, element: String },
    /// Removes every occurrence of an element from a list.
    ListRemove { key: String, element: String },
    /// Reads an inclusive index range of a list; negative indices count from the tail.
    ListRange { key: String, start: i64, stop: i64 },
    /// Returns the length of a list.
    ListLen { key: String },
    /// Deletes one key of any type.
    Delete { key: String },
}

/// Reply produced by the keyspace for one command.
///
/// The reply enum is kept protocol-neutral; callers match on the shape they expect and treat
/// anything else as a store-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvReply {
    /// Write acknowledged.
    Ok,
    /// Count or length reply.
    Integer(i64),
    /// One optional field value.
    Value(Option<String>),
    /// Per-field values preserving request order; absent fields are `None`.
    Values(Vec<Option<String>>),
    /// Full hash payload sorted by field name; empty when the key is absent.
    Map(Vec<(String, String)>),
    /// List elements in list order; empty when the key is absent.
    Elements(Vec<String>),
    /// Command-level failure, e.g. a type clash.
    Error(String),
}
