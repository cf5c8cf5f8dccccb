//! StateStore — redb-backed catalog persistence for FOrcE.
//!
//! Provides keyed JSON storage over the catalog tables plus a change feed.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing). Typed, tenant-scoped access goes through [`TenantStore`].

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::events::{StoreEvent, StoreEventKind};
use crate::tables::*;
use crate::tenant::TenantStore;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

pub(crate) type Table = TableDefinition<'static, &'static str, &'static [u8]>;

const EVENT_BUFFER: usize = 256;

/// Thread-safe catalog store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
    /// Open (or create) a persistent catalog at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::with_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory catalog (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::with_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn with_database(db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            db: Arc::new(db),
            events,
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            JOBS,
            ENTITIES,
            FDUS,
            VIRTUAL_LINKS,
            ENTITY_RECORDS,
            FDU_RECORDS,
            FIMS,
            CLOUDS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Connector scoped to one tenant of one system.
    pub fn tenant(&self, system_id: &str, tenant_id: &str) -> TenantStore {
        TenantStore::new(self.clone(), system_id, tenant_id)
    }

    /// Subscribe to committed changes. Filter with [`StoreEvent::matches`].
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, table: Table, key: &str, kind: StoreEventKind, value: Option<&[u8]>) {
        if self.events.receiver_count() == 0 {
            return;
        }
        let event = StoreEvent {
            key: format!("{}/{key}", table.name()),
            kind,
            value: value.map(<[u8]>::to_vec),
        };
        // No receivers left between the check and the send is fine.
        let _ = self.events.send(event);
    }

    // ── Keyed access ───────────────────────────────────────────────

    /// Insert or replace a value.
    pub(crate) fn put_value<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = table.name(), %key, "value stored");
        self.notify(table, key, StoreEventKind::Put, Some(&bytes));
        Ok(())
    }

    /// Insert or replace a value unless `refuse` rejects the current one.
    /// Check and write happen in one transaction. Returns whether the
    /// value was written.
    pub(crate) fn put_value_unless<T, F>(
        &self,
        table: Table,
        key: &str,
        value: &T,
        refuse: F,
    ) -> StateResult<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            let current: Option<T> = match t.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            if current.as_ref().is_some_and(refuse) {
                debug!(table = table.name(), %key, "write refused");
                return Ok(false);
            }
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = table.name(), %key, "value stored");
        self.notify(table, key, StoreEventKind::Put, Some(&bytes));
        Ok(true)
    }

    pub(crate) fn get_value<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    pub(crate) fn scan<T: DeserializeOwned>(
        &self,
        table: Table,
        prefix: &str,
    ) -> StateResult<Vec<(String, T)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let decoded: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push((key.value().to_string(), decoded));
            }
        }
        Ok(results)
    }

    /// Delete a key. Returns true if it existed.
    pub(crate) fn remove_value(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = table.name(), %key, existed, "value removed");
        if existed {
            self.notify(table, key, StoreEventKind::Remove, None);
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use force_core::{EntityRecord, EntityStatus};

    #[test]
    fn put_get_remove() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_value(JOBS, "s/t/a", &serde_json::json!({"x": 1})).unwrap();

        let value: Option<serde_json::Value> = store.get_value(JOBS, "s/t/a").unwrap();
        assert_eq!(value.unwrap()["x"], 1);

        assert!(store.remove_value(JOBS, "s/t/a").unwrap());
        assert!(!store.remove_value(JOBS, "s/t/a").unwrap());
        let gone: Option<serde_json::Value> = store.get_value(JOBS, "s/t/a").unwrap();
        assert!(gone.is_none());
    }

    #[test]
    fn scan_respects_prefix() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_value(JOBS, "s/t/a", &1).unwrap();
        store.put_value(JOBS, "s/t/b", &2).unwrap();
        store.put_value(JOBS, "s/u/a", &3).unwrap();

        let hits: Vec<(String, i32)> = store.scan(JOBS, "s/t/").unwrap();
        assert_eq!(hits, vec![("s/t/a".to_string(), 1), ("s/t/b".to_string(), 2)]);
    }

    #[test]
    fn put_unless_keeps_current_value() {
        let store = StateStore::open_in_memory().unwrap();
        let mut record = EntityRecord::new("e", "i", None, None);
        record.status = EntityStatus::Offloaded;
        store.put_value(ENTITY_RECORDS, "s/t/e/i", &record).unwrap();

        record.status = EntityStatus::Running;
        let written = store
            .put_value_unless(ENTITY_RECORDS, "s/t/e/i", &record, |current: &EntityRecord| {
                current.status.is_terminal()
            })
            .unwrap();
        assert!(!written);

        let stored: EntityRecord = store.get_value(ENTITY_RECORDS, "s/t/e/i").unwrap().unwrap();
        assert_eq!(stored.status, EntityStatus::Offloaded);
    }

    #[test]
    fn events_follow_commits() {
        let store = StateStore::open_in_memory().unwrap();
        let mut rx = store.subscribe();

        store.put_value(JOBS, "s/t/j1", &"queued").unwrap();
        store.remove_value(JOBS, "s/t/j1").unwrap();
        store.remove_value(JOBS, "s/t/j1").unwrap();

        let put = rx.try_recv().unwrap();
        assert_eq!(put.key, "jobs/s/t/j1");
        assert_eq!(put.kind, StoreEventKind::Put);
        assert_eq!(put.decode::<String>().as_deref(), Some("queued"));

        let removed = rx.try_recv().unwrap();
        assert_eq!(removed.kind, StoreEventKind::Remove);
        assert!(removed.value.is_none());

        // Removing a missing key emits nothing.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_value(JOBS, "s/t/k", &"v").unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let value: Option<String> = store.get_value(JOBS, "s/t/k").unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }
}
