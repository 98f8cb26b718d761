//! Data models for Jot

mod record;

pub use record::{now_ms, AccessEntry, CacheEntry, IdName, Record};
