//! End-to-end lifecycle of a record: draft, push with id remapping,
//! concurrent edits with a three-way merge, and remote deletion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use jot_core::codec::{RecordCodec, WireRecord};
use jot_core::db::{CacheStore, Database};
use jot_core::error::{Error, Result};
use jot_core::events::{EventBus, SaveAllStatus, SyncEvent};
use jot_core::merge::MergeEngine;
use jot_core::sync::{RemoteAuthority, SyncEngine};
use jot_core::{IdName, Record};

const VIEWER: i64 = 7;

/// In-memory stand-in for the remote authority. Saves assign sequential
/// ids to drafts and stamp a fresh savetime.
#[derive(Clone)]
struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

struct ServerState {
    records: HashMap<i64, WireRecord>,
    next_id: i64,
    clock: i64,
}

impl FakeServer {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                records: HashMap::new(),
                next_id: 100,
                clock: 1_000,
            })),
        }
    }

    /// Another client edits a record directly on the server.
    fn edit_elsewhere(&self, id: i64, body: &str) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let clock = state.clock;
        let record = state.records.get_mut(&id).expect("record exists");
        record.body = body.to_string();
        record.savetime = Some(clock);
    }

    fn delete_elsewhere(&self, id: i64) {
        self.state.lock().unwrap().records.remove(&id);
    }
}

#[async_trait]
impl RemoteAuthority for FakeServer {
    async fn fetch(&self, id: i64) -> Result<WireRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Api(format!("no record {id} (404)")))
    }

    async fn save(&self, record: &Record) -> Result<Option<WireRecord>> {
        let mut state = self.state.lock().unwrap();
        if record.id >= 0 && !state.records.contains_key(&record.id) {
            // Deleted remotely: the save reply is empty.
            return Ok(None);
        }

        let id = if record.id < 0 {
            state.next_id += 1;
            state.next_id
        } else {
            record.id
        };
        state.clock += 1;
        let wire = WireRecord {
            id,
            group: record.group.clone(),
            owner: IdName {
                id: VIEWER,
                name: "viewer".to_string(),
            },
            title: String::new(),
            body: record.text.clone(),
            savetime: Some(state.clock),
        };
        state.records.insert(id, wire.clone());
        Ok(Some(wire))
    }
}

async fn setup() -> (SyncEngine<FakeServer>, FakeServer, Database, EventBus) {
    let db = Database::open_in_memory().await.unwrap();
    let events = EventBus::new();
    let codec = RecordCodec::new(VIEWER);
    let store = CacheStore::new(db.connection().clone(), codec, events.clone());
    let server = FakeServer::new();
    let engine = SyncEngine::new(
        store,
        server.clone(),
        codec,
        MergeEngine::new(),
        events.clone(),
    );
    (engine, server, db, events)
}

fn drain(receiver: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread")]
async fn full_record_lifecycle() {
    let (engine, server, _db, events) = setup().await;
    let mut receiver = events.subscribe();

    // 1. Draft a note offline.
    let draft = Record::draft("groceries\nmilk\neggs", None);
    let draft_id = draft.id;
    engine.store().write_local(draft).await.unwrap();
    assert_eq!(engine.store().list_unsaved().await.unwrap().len(), 1);

    // 2. Push: the server assigns id 101 and the cache re-keys the entry.
    assert_eq!(engine.push_all().await.unwrap(), 1);
    assert_eq!(engine.store().read_local(draft_id).await.unwrap(), None);
    let synced = engine.store().read_local(101).await.unwrap().unwrap();
    assert_eq!(synced.text, "groceries\nmilk\neggs");
    assert!(engine.store().list_unsaved().await.unwrap().is_empty());

    let observed = drain(&mut receiver);
    assert!(observed.contains(&SyncEvent::RecordIdChanged {
        old: draft_id,
        new: 101
    }));
    assert_eq!(
        observed.last(),
        Some(&SyncEvent::SaveAllStatus(SaveAllStatus::Success))
    );

    // 3. Concurrent edits: another client appends while we prepend.
    engine
        .store()
        .write_local(Record {
            text: "URGENT\ngroceries\nmilk\neggs".to_string(),
            ..synced
        })
        .await
        .unwrap();
    server.edit_elsewhere(101, "groceries\nmilk\neggs\nbutter");

    // 4. Push detects the divergence and merges both edits.
    assert_eq!(engine.push_all().await.unwrap(), 1);
    let merged = engine.store().read_local(101).await.unwrap().unwrap();
    assert_eq!(merged.text, "URGENT\ngroceries\nmilk\neggs\nbutter");
    assert!(drain(&mut receiver)
        .iter()
        .any(|event| matches!(event, SyncEvent::ConflictMerged { id: 101, .. })));

    // 5. Pull returns the reconciled server copy.
    let mut cached = None;
    let pulled = engine
        .pull(101, |record| cached = Some(record.text))
        .await
        .unwrap();
    assert_eq!(cached.as_deref(), Some("URGENT\ngroceries\nmilk\neggs\nbutter"));
    assert_eq!(pulled.text, "URGENT\ngroceries\nmilk\neggs\nbutter");

    // 6. The record disappears remotely; pushing a local edit drops it.
    engine
        .store()
        .write_local(Record {
            text: "edited after remote deletion".to_string(),
            ..pulled
        })
        .await
        .unwrap();
    server.delete_elsewhere(101);
    // The pre-push fetch no longer finds the record, so the batch fails
    // and the local edit survives for a later retry.
    assert!(engine.push_all().await.is_err());
    assert!(engine.store().read_local(101).await.unwrap().is_some());
}
