//! Keyed backing store used by the transaction session store.
//!
//! The coordinator persists session state into a Redis-compatible keyed data store that offers
//! per-key command serialization, non-atomic pipelines, and optimistic watch/exec transactions,
//! but no cross-key ACID guarantees. This crate carries that contract: a typed command
//! vocabulary, the in-process keyspace engine implementing it, and a pooled connection source
//! whose handles expose the three submission modes.

pub mod command;
pub mod containers;
pub mod keyspace;
pub mod pool;
