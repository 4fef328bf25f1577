//! Shared primitives used by all `txcoord` session store crates.
//!
//! This crate is intentionally minimal and dependency-light, so it can sit at the bottom of the
//! dependency graph.

pub mod config;
pub mod error;
pub mod ids;
pub mod time;
