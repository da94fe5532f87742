//! Database module: the persisted sent-item record and its SQL repository.
//!
//! - `model`: the row type returned by queries.
//! - `repo`: pool setup and SQL-only functions over `sent_items`.
//!
//! Callers normally go through [`crate::dedup::DedupStore`], which layers the
//! delivery semantics (best-effort writes, at-least-once lookups) on top.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::SentRecord;
