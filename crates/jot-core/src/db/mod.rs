//! Local cache persistence for Jot

mod cache_store;
mod connection;
mod migrations;

pub use cache_store::CacheStore;
pub use connection::Database;
