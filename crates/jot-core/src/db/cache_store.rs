//! Transactional cache store for records and access times
//!
//! Every operation runs inside a single transaction spanning its
//! read-modify-write steps, so a local edit and a same-id remote-driven
//! overwrite can never lose an update, and a caller abandoning an operation
//! mid-flight leaves the cache untouched.

use libsql::{params, Connection, Row, Transaction, Value};

use crate::codec::{RecordCodec, WireRecord};
use crate::error::{Error, Result};
use crate::events::{EventBus, SyncEvent};
use crate::models::{now_ms, AccessEntry, CacheEntry, Record};

/// Durable storage for `CacheEntry` and `AccessEntry` keyed by record id
pub struct CacheStore {
    conn: Connection,
    codec: RecordCodec,
    events: EventBus,
}

impl CacheStore {
    pub fn new(conn: Connection, codec: RecordCodec, events: EventBus) -> Self {
        Self {
            conn,
            codec,
            events,
        }
    }

    /// Read the local edit state of a record.
    ///
    /// "No cached copy" is a normal case, not an error. Bumps the record's
    /// access time as a side effect.
    pub async fn read_local(&self, id: i64) -> Result<Option<Record>> {
        let tx = self.conn.transaction().await?;
        touch_access(&tx, id, now_ms()).await?;
        let entry = read_entry(&tx, id).await?;
        tx.commit().await?;
        Ok(entry.map(|entry| entry.local))
    }

    /// Content-aware idempotent local write.
    ///
    /// A record identical to the cached local state (same id, text, and
    /// group) is not rewritten and keeps its timestamp. Otherwise the
    /// record is stamped with the current time and replaces `local`; the
    /// confirmed server snapshot is left untouched.
    pub async fn write_local(&self, record: Record) -> Result<Record> {
        let now = now_ms();
        let tx = self.conn.transaction().await?;
        touch_access(&tx, record.id, now).await?;

        let stored = match read_entry(&tx, record.id).await? {
            None => {
                let mut record = record;
                record.timestamp = Some(now);
                let entry = CacheEntry::from_record(record);
                write_entry(&tx, &entry).await?;
                entry.local
            }
            Some(entry) if RecordCodec::equal(&record, &entry.local) => {
                tracing::debug!(id = entry.id, "local write skipped, no change");
                entry.local
            }
            Some(entry) => {
                let mut record = record;
                record.timestamp = Some(now);
                let entry = CacheEntry {
                    id: entry.id,
                    local: record,
                    server: entry.server,
                };
                write_entry(&tx, &entry).await?;
                entry.local
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    /// Store a record fetched from the remote authority, unless the cached
    /// local edit is more recent.
    ///
    /// Returns the record the caller should use: the normalized server copy
    /// when it won, the untouched local edit when it did not.
    pub async fn write_from_remote(&self, wire: WireRecord) -> Result<Record> {
        let record = self.codec.normalize(wire);
        let tx = self.conn.transaction().await?;
        touch_access(&tx, record.id, now_ms()).await?;

        let stored = match read_entry(&tx, record.id).await? {
            Some(entry) if RecordCodec::is_more_recent(Some(&entry.local), &record) => {
                tracing::debug!(id = entry.id, "local edit wins over fetched copy");
                entry.local
            }
            _ => {
                let entry = CacheEntry::synced(record);
                write_entry(&tx, &entry).await?;
                entry.local
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    /// Reconcile the cache after a push reply.
    ///
    /// An empty reply means the record no longer exists remotely: its cache
    /// and access rows are removed. A reply for a pushed draft re-keys the
    /// entry under the remote-assigned id and announces the id change. In
    /// all reply cases the entry becomes `local = server = normalized`.
    pub async fn write_after_push(
        &self,
        old_id: i64,
        reply: Option<WireRecord>,
    ) -> Result<Option<Record>> {
        let tx = self.conn.transaction().await?;

        if reply.is_none() || old_id < 0 {
            delete_rows(&tx, old_id).await?;
        }

        let Some(wire) = reply else {
            tx.commit().await?;
            tracing::debug!(id = old_id, "record deleted remotely, cache entry dropped");
            self.events.emit(SyncEvent::RecordDeleted(old_id));
            return Ok(None);
        };

        let record = self.codec.normalize(wire);
        let entry = CacheEntry::synced(record);
        write_entry(&tx, &entry).await?;
        touch_access(&tx, entry.id, now_ms()).await?;
        tx.commit().await?;

        if old_id < 0 {
            tracing::debug!(old_id, new_id = entry.id, "draft acknowledged by server");
            self.events.emit(SyncEvent::RecordIdChanged {
                old: old_id,
                new: entry.id,
            });
        }
        Ok(Some(entry.local))
    }

    /// All entries whose local edit has not been confirmed by the server.
    ///
    /// Full scan; the unsaved predicate is the sole selection basis.
    pub async fn list_unsaved(&self) -> Result<Vec<CacheEntry>> {
        let mut rows = self
            .conn
            .query("SELECT id, local, server FROM records", ())
            .await?;

        let mut unsaved = Vec::new();
        while let Some(row) = rows.next().await? {
            let entry = entry_from_row(&row)?;
            if entry.is_unsaved() {
                unsaved.push(entry);
            }
        }
        Ok(unsaved)
    }

    /// All access times, most recently used first.
    pub async fn list_access_times(&self) -> Result<Vec<AccessEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, last_access FROM access ORDER BY last_access DESC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(AccessEntry {
                id: row.get(0)?,
                last_access: row.get(1)?,
            });
        }
        Ok(entries)
    }

    /// Remove a record's cache entry and access entry, both-or-neither.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let tx = self.conn.transaction().await?;
        delete_rows(&tx, id).await?;
        tx.commit().await?;

        tracing::debug!(id, "record deleted from cache");
        self.events.emit(SyncEvent::RecordDeleted(id));
        Ok(())
    }
}

/// Upsert the access time for a record id.
async fn touch_access(tx: &Transaction, id: i64, at: i64) -> Result<()> {
    tx.execute(
        "INSERT INTO access (id, last_access) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET last_access = excluded.last_access",
        params![id, at],
    )
    .await?;
    Ok(())
}

async fn read_entry(tx: &Transaction, id: i64) -> Result<Option<CacheEntry>> {
    let mut rows = tx
        .query(
            "SELECT id, local, server FROM records WHERE id = ?1",
            params![id],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(entry_from_row(&row)?)),
        None => Ok(None),
    }
}

fn entry_from_row(row: &Row) -> Result<CacheEntry> {
    let id: i64 = row.get(0)?;
    let local: String = row.get(1)?;
    let server = match row.get_value(2)? {
        Value::Text(json) => Some(serde_json::from_str(&json)?),
        Value::Null => None,
        other => {
            return Err(Error::Storage(format!(
                "unexpected server column type for record {id}: {other:?}"
            )))
        }
    };

    Ok(CacheEntry {
        id,
        local: serde_json::from_str(&local)?,
        server,
    })
}

async fn write_entry(tx: &Transaction, entry: &CacheEntry) -> Result<()> {
    let local = serde_json::to_string(&entry.local)?;
    match &entry.server {
        Some(server) => {
            let server = serde_json::to_string(server)?;
            tx.execute(
                "INSERT OR REPLACE INTO records (id, local, server) VALUES (?1, ?2, ?3)",
                params![entry.id, local, server],
            )
            .await?;
        }
        None => {
            tx.execute(
                "INSERT OR REPLACE INTO records (id, local, server) VALUES (?1, ?2, NULL)",
                params![entry.id, local],
            )
            .await?;
        }
    }
    Ok(())
}

async fn delete_rows(tx: &Transaction, id: i64) -> Result<()> {
    tx.execute("DELETE FROM records WHERE id = ?1", params![id])
        .await?;
    tx.execute("DELETE FROM access WHERE id = ?1", params![id])
        .await?;
    Ok(())
}
