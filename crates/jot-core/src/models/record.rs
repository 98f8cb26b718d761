//! Record model and cache row shapes

use serde::{Deserialize, Serialize};

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A reference to a named entity (group or user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdName {
    pub id: i64,
    pub name: String,
}

/// A note record in its canonical in-memory shape
///
/// Negative ids denote a client-created draft the remote authority has not
/// acknowledged yet; non-negative ids are remote-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier (negative for unacknowledged drafts)
    pub id: i64,
    /// Full body: title and content folded into one string, no carriage returns
    pub text: String,
    /// Containing collection, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<IdName>,
    /// Owning user, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdName>,
    /// When this exact local content was produced (Unix ms); absent for
    /// content never modified after a remote fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// True when the current viewer is not the owner
    #[serde(default)]
    pub readonly: bool,
}

impl Record {
    /// Create a new local draft with a temporary negative id.
    ///
    /// The id is minted from the current time so concurrent drafts on one
    /// client do not collide.
    pub fn draft(text: impl Into<String>, group: Option<IdName>) -> Self {
        let now = now_ms();
        Self {
            id: -now,
            text: text.into(),
            group,
            owner: None,
            timestamp: Some(now),
            readonly: false,
        }
    }

    /// True when this record was created locally and never acknowledged by
    /// the remote authority.
    pub const fn is_draft(&self) -> bool {
        self.id < 0
    }
}

/// Local-store row pairing a record's edit state with its last-known-synced
/// server state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: i64,
    /// Current local edit state
    pub local: Record,
    /// Last server state this client confirmed; `None` until the record has
    /// round-tripped through the remote authority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Record>,
}

impl CacheEntry {
    /// Build a fresh entry for a record with no prior cache row.
    ///
    /// Drafts get no server snapshot; records with a remote-assigned id are
    /// assumed to mirror the server copy they came from.
    pub fn from_record(record: Record) -> Self {
        if record.id < 0 {
            Self {
                id: record.id,
                local: record,
                server: None,
            }
        } else {
            Self {
                id: record.id,
                server: Some(record.clone()),
                local: record,
            }
        }
    }

    /// Build an entry whose local and server states are the same record,
    /// as after a successful round-trip through the remote authority.
    pub fn synced(record: Record) -> Self {
        Self {
            id: record.id,
            server: Some(record.clone()),
            local: record,
        }
    }

    /// The unsaved predicate: no confirmed server snapshot, or a local edit
    /// strictly newer than it.
    ///
    /// An absent timestamp on either side never compares greater, so an
    /// entry whose snapshot has no timestamp is not unsaved on that basis
    /// alone.
    pub fn is_unsaved(&self) -> bool {
        match &self.server {
            None => true,
            Some(server) => match (self.local.timestamp, server.timestamp) {
                (Some(local), Some(confirmed)) => local > confirmed,
                _ => false,
            },
        }
    }
}

/// Per-record access time, used only for recency ordering in listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub id: i64,
    /// Last read or write (Unix ms)
    pub last_access: i64,
}
