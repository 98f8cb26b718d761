//! jot-core - Core library for Jot
//!
//! The offline-first synchronization core of the Jot note client: a local
//! persistent cache of records, divergence detection against a remote
//! authority, and automatic three-way text merge of concurrent edits.

pub mod codec;
pub mod db;
pub mod error;
pub mod events;
pub mod merge;
pub mod models;
pub mod sync;

pub use error::{Error, Result};
pub use models::{AccessEntry, CacheEntry, IdName, Record};
