//! Wire record normalization and record comparison rules

use serde::{Deserialize, Serialize};

use crate::models::{IdName, Record};

/// The shape the remote authority exchanges for a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<IdName>,
    pub owner: IdName,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savetime: Option<i64>,
}

/// Converts wire records into the canonical shape and decides record
/// equality and staleness ordering.
///
/// Constructed once with the viewer's identity and handed by reference to
/// the cache store and sync engine.
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    viewer_id: i64,
}

impl RecordCodec {
    pub const fn new(viewer_id: i64) -> Self {
        Self { viewer_id }
    }

    /// Normalize a wire record into the canonical shape.
    ///
    /// Title and body fold into one text blob with carriage returns
    /// stripped; `savetime` becomes the record timestamp; the record is
    /// read-only when the viewer is not the owner.
    pub fn normalize(&self, wire: WireRecord) -> Record {
        let text = format!("{}{}", wire.title, wire.body).replace('\r', "");
        Record {
            id: wire.id,
            text,
            group: wire.group,
            readonly: wire.owner.id != self.viewer_id,
            owner: Some(wire.owner),
            timestamp: wire.savetime,
        }
    }

    /// Content equality for cache-write decisions: same id, same text, and
    /// same group reference (or both absent).
    ///
    /// TODO: ownership changes are not detected here, so a pure owner
    /// transfer does not mark the record as changed.
    pub fn equal(a: &Record, b: &Record) -> bool {
        a.id == b.id
            && a.text == b.text
            && a.group.as_ref().map(|g| g.id) == b.group.as_ref().map(|g| g.id)
    }

    /// The staleness tie-break: is `first` strictly more recent than
    /// `second`?
    ///
    /// False when `first` is absent; true when `second` carries no
    /// timestamp (unknown provenance is treated as older, so local wins by
    /// default). Only ever invoked as `(cached local, incoming from
    /// server)` to decide whether an unsolicited fetch may overwrite a
    /// newer local edit.
    pub fn is_more_recent(first: Option<&Record>, second: &Record) -> bool {
        let Some(first) = first else {
            return false;
        };
        let Some(second_ts) = second.timestamp else {
            return true;
        };
        first.timestamp.is_some_and(|first_ts| first_ts > second_ts)
    }
}
