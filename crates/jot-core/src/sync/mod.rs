//! Pull and push orchestration against the remote authority

mod remote;

pub use remote::{HttpRemote, RemoteAuthority};

use crate::codec::RecordCodec;
use crate::db::CacheStore;
use crate::error::Result;
use crate::events::{EventBus, SaveAllStatus, SyncEvent};
use crate::merge::MergeEngine;
use crate::models::{CacheEntry, Record};

/// Orchestrates pull (fetch + merge-on-arrival) and push (batch upload with
/// conflict resolution and id remapping).
///
/// Single-flow: operations suspend the caller and records are processed one
/// at a time, so a conflict resolved for one record cannot race another.
pub struct SyncEngine<R: RemoteAuthority> {
    store: CacheStore,
    remote: R,
    codec: RecordCodec,
    merge: MergeEngine,
    events: EventBus,
}

impl<R: RemoteAuthority> SyncEngine<R> {
    pub fn new(
        store: CacheStore,
        remote: R,
        codec: RecordCodec,
        merge: MergeEngine,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            remote,
            codec,
            merge,
            events,
        }
    }

    /// The cache store backing this engine.
    pub const fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Fetch one record, reconciling the server copy into the cache.
    ///
    /// A cached copy, if any, is handed to `on_cached` before the network
    /// round-trip so the caller can display it optimistically. The returned
    /// record is the final value: the server copy, or the untouched local
    /// edit when it is more recent. An authentication failure surfaces as
    /// [`crate::Error::Unauthenticated`] and is not retried; previously
    /// cached content stays valid on any failure.
    pub async fn pull<F>(&self, id: i64, on_cached: F) -> Result<Record>
    where
        F: FnOnce(Record),
    {
        if let Some(cached) = self.store.read_local(id).await? {
            on_cached(cached);
        }

        tracing::debug!(id, "fetching record from server");
        let wire = self.remote.fetch(id).await?;
        self.store.write_from_remote(wire).await
    }

    /// Push every unsaved record to the remote authority.
    ///
    /// The unsaved set is processed sequentially in unspecified order. The
    /// first per-record failure aborts the remaining batch and is returned;
    /// records reconciled before it stay committed. Returns the number of
    /// records pushed.
    pub async fn push_all(&self) -> Result<usize> {
        let unsaved = self.store.list_unsaved().await?;
        if unsaved.is_empty() {
            return Ok(0);
        }

        let total = unsaved.len();
        tracing::debug!(total, "pushing unsaved records");
        self.events
            .emit(SyncEvent::SaveAllStatus(SaveAllStatus::Processing));

        for entry in unsaved {
            let id = entry.id;
            if let Err(error) = self.push_one(entry).await {
                tracing::warn!(id, %error, "push aborted");
                self.events
                    .emit(SyncEvent::SaveAllStatus(SaveAllStatus::Failed));
                return Err(error);
            }
        }

        self.events
            .emit(SyncEvent::SaveAllStatus(SaveAllStatus::Success));
        Ok(total)
    }

    /// Push a single entry: conflict check and merge for pre-existing
    /// records, then save and reconcile.
    async fn push_one(&self, mut entry: CacheEntry) -> Result<()> {
        if entry.id >= 0 {
            let fetched = self.codec.normalize(self.remote.fetch(entry.id).await?);
            if let Some(server) = &entry.server {
                if remote_diverged(server, &fetched) {
                    tracing::debug!(id = entry.id, "conflict detected, merging");
                    let merged = self
                        .merge
                        .merge(&server.text, &entry.local.text, &fetched.text);
                    entry.local.text = merged.clone();
                    self.events.emit(SyncEvent::ConflictMerged {
                        id: entry.id,
                        text: merged,
                    });
                }
            }
        }

        let reply = self.remote.save(&entry.local).await?;
        self.store.write_after_push(entry.id, reply).await?;
        Ok(())
    }
}

/// Did the server copy move past the snapshot this client last confirmed?
///
/// A fetched copy without a timestamp proves nothing and never conflicts; a
/// confirmed snapshot without a timestamp is of unknown age, so a
/// timestamped fetch against it merges to stay safe.
fn remote_diverged(confirmed: &Record, fetched: &Record) -> bool {
    match (fetched.timestamp, confirmed.timestamp) {
        (Some(fetched_ts), Some(confirmed_ts)) => fetched_ts > confirmed_ts,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
