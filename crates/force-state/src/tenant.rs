//! TenantStore — the store connector a tenant owns.
//!
//! Every key is scoped under `{system}/{tenant}/`. Closing the connector
//! makes every later call fail with [`StateError::Closed`]; the database
//! itself stays open for other tenants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use force_core::{
    CloudInfo, EntityDescriptor, EntityRecord, FduDescriptor, FduRecord, FimInfo, Job,
    VirtualLinkDescriptor,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, Table};
use crate::tables::*;

#[derive(Clone)]
pub struct TenantStore {
    store: StateStore,
    prefix: String,
    closed: Arc<AtomicBool>,
}

impl TenantStore {
    pub(crate) fn new(store: StateStore, system_id: &str, tenant_id: &str) -> Self {
        Self {
            store,
            prefix: format!("{system_id}/{tenant_id}/"),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `{system}/{tenant}/`, the prefix of every key this connector writes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The underlying database, for subscriptions.
    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    fn check_open(&self) -> StateResult<()> {
        if self.is_closed() {
            return Err(StateError::Closed(self.prefix.trim_end_matches('/').to_string()));
        }
        Ok(())
    }

    fn key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }

    fn put<T: Serialize>(&self, table: Table, id: &str, value: &T) -> StateResult<()> {
        self.check_open()?;
        self.store.put_value(table, &self.key(id), value)
    }

    fn get<T: DeserializeOwned>(&self, table: Table, id: &str) -> StateResult<Option<T>> {
        self.check_open()?;
        self.store.get_value(table, &self.key(id))
    }

    fn list<T: DeserializeOwned>(&self, table: Table, sub_prefix: &str) -> StateResult<Vec<T>> {
        self.check_open()?;
        let entries = self.store.scan(table, &self.key(sub_prefix))?;
        Ok(entries.into_iter().map(|(_, value)| value).collect())
    }

    fn remove(&self, table: Table, id: &str) -> StateResult<bool> {
        self.check_open()?;
        self.store.remove_value(table, &self.key(id))
    }

    // ── Jobs ───────────────────────────────────────────────────────

    pub fn put_job(&self, job: &Job) -> StateResult<()> {
        self.put(JOBS, &job.job_id, job)
    }

    pub fn get_job(&self, job_id: &str) -> StateResult<Option<Job>> {
        self.get(JOBS, job_id)
    }

    pub fn list_jobs(&self) -> StateResult<Vec<Job>> {
        self.list(JOBS, "")
    }

    pub fn remove_job(&self, job_id: &str) -> StateResult<bool> {
        self.remove(JOBS, job_id)
    }

    // ── Descriptors ────────────────────────────────────────────────

    pub fn put_entity(&self, entity: &EntityDescriptor) -> StateResult<()> {
        self.put(ENTITIES, entity.key(), entity)
    }

    pub fn get_entity(&self, entity_id: &str) -> StateResult<Option<EntityDescriptor>> {
        self.get(ENTITIES, entity_id)
    }

    pub fn list_entities(&self) -> StateResult<Vec<EntityDescriptor>> {
        self.list(ENTITIES, "")
    }

    pub fn remove_entity(&self, entity_id: &str) -> StateResult<bool> {
        self.remove(ENTITIES, entity_id)
    }

    pub fn put_fdu(&self, fdu: &FduDescriptor) -> StateResult<()> {
        self.put(FDUS, fdu.key(), fdu)
    }

    pub fn get_fdu(&self, fdu_id: &str) -> StateResult<Option<FduDescriptor>> {
        self.get(FDUS, fdu_id)
    }

    pub fn list_fdus(&self) -> StateResult<Vec<FduDescriptor>> {
        self.list(FDUS, "")
    }

    pub fn remove_fdu(&self, fdu_id: &str) -> StateResult<bool> {
        self.remove(FDUS, fdu_id)
    }

    pub fn put_virtual_link(&self, vl: &VirtualLinkDescriptor) -> StateResult<()> {
        self.put(VIRTUAL_LINKS, vl.key(), vl)
    }

    pub fn get_virtual_link(&self, vl_id: &str) -> StateResult<Option<VirtualLinkDescriptor>> {
        self.get(VIRTUAL_LINKS, vl_id)
    }

    pub fn remove_virtual_link(&self, vl_id: &str) -> StateResult<bool> {
        self.remove(VIRTUAL_LINKS, vl_id)
    }

    // ── Entity instances ───────────────────────────────────────────

    /// Store an entity record. A record already `OFFLOADED` is never
    /// overwritten with another status; returns `false` in that case.
    pub fn put_entity_record(&self, record: &EntityRecord) -> StateResult<bool> {
        self.check_open()?;
        let status = record.status;
        self.store.put_value_unless(
            ENTITY_RECORDS,
            &self.key(&record.table_key()),
            record,
            |current: &EntityRecord| current.status.is_terminal() && current.status != status,
        )
    }

    pub fn get_entity_record(
        &self,
        entity_id: &str,
        instance_id: &str,
    ) -> StateResult<Option<EntityRecord>> {
        self.get(ENTITY_RECORDS, &format!("{entity_id}/{instance_id}"))
    }

    /// Look up an instance without knowing its entity.
    pub fn find_entity_record(&self, instance_id: &str) -> StateResult<Option<EntityRecord>> {
        self.check_open()?;
        let suffix = format!("/{instance_id}");
        let entries = self
            .store
            .scan::<EntityRecord>(ENTITY_RECORDS, &self.prefix)?;
        Ok(entries
            .into_iter()
            .find(|(key, _)| key.ends_with(&suffix))
            .map(|(_, record)| record))
    }

    /// Instances of one entity, or of every entity.
    pub fn list_entity_records(&self, entity_id: Option<&str>) -> StateResult<Vec<EntityRecord>> {
        match entity_id {
            Some(id) => self.list(ENTITY_RECORDS, &format!("{id}/")),
            None => self.list(ENTITY_RECORDS, ""),
        }
    }

    pub fn remove_entity_record(&self, entity_id: &str, instance_id: &str) -> StateResult<bool> {
        self.remove(ENTITY_RECORDS, &format!("{entity_id}/{instance_id}"))
    }

    // ── FDU instances ──────────────────────────────────────────────

    pub fn put_fdu_record(&self, record: &FduRecord) -> StateResult<()> {
        self.put(FDU_RECORDS, &record.table_key(), record)
    }

    pub fn list_fdu_records(&self, fdu_id: &str) -> StateResult<Vec<FduRecord>> {
        self.list(FDU_RECORDS, &format!("{fdu_id}/"))
    }

    pub fn remove_fdu_record(&self, fdu_id: &str, instance_id: &str) -> StateResult<bool> {
        self.remove(FDU_RECORDS, &format!("{fdu_id}/{instance_id}"))
    }

    // ── Backend bindings ───────────────────────────────────────────

    pub fn put_fim_info(&self, info: &FimInfo) -> StateResult<()> {
        self.put(FIMS, &info.uuid, info)
    }

    pub fn get_fim_info(&self, fim_id: &str) -> StateResult<Option<FimInfo>> {
        self.get(FIMS, fim_id)
    }

    pub fn list_fim_infos(&self) -> StateResult<Vec<FimInfo>> {
        self.list(FIMS, "")
    }

    pub fn remove_fim_info(&self, fim_id: &str) -> StateResult<bool> {
        self.remove(FIMS, fim_id)
    }

    pub fn put_cloud_info(&self, info: &CloudInfo) -> StateResult<()> {
        self.put(CLOUDS, &info.uuid, info)
    }

    pub fn get_cloud_info(&self, cloud_id: &str) -> StateResult<Option<CloudInfo>> {
        self.get(CLOUDS, cloud_id)
    }

    pub fn list_cloud_infos(&self) -> StateResult<Vec<CloudInfo>> {
        self.list(CLOUDS, "")
    }

    pub fn remove_cloud_info(&self, cloud_id: &str) -> StateResult<bool> {
        self.remove(CLOUDS, cloud_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use force_core::{EntityStatus, FduState, JobPayload};

    fn tenant() -> TenantStore {
        StateStore::open_in_memory().unwrap().tenant("sys", "ten")
    }

    fn record(entity: &str, instance: &str, status: EntityStatus) -> EntityRecord {
        let mut r = EntityRecord::new(entity, instance, Some("fim".to_string()), None);
        r.status = status;
        r
    }

    #[test]
    fn jobs_round_trip() {
        let store = tenant();
        let job = Job::queued("j1".to_string(), "client".to_string(), JobPayload::Test);
        store.put_job(&job).unwrap();

        assert_eq!(store.get_job("j1").unwrap(), Some(job));
        assert_eq!(store.list_jobs().unwrap().len(), 1);
        assert!(store.remove_job("j1").unwrap());
        assert!(store.get_job("j1").unwrap().is_none());
    }

    #[test]
    fn tenants_are_isolated() {
        let db = StateStore::open_in_memory().unwrap();
        let a = db.tenant("sys", "a");
        let b = db.tenant("sys", "b");

        a.put_job(&Job::queued("j1".to_string(), "c".to_string(), JobPayload::Test))
            .unwrap();

        assert!(b.get_job("j1").unwrap().is_none());
        assert!(b.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn offloaded_record_is_final() {
        let store = tenant();
        assert!(store.put_entity_record(&record("e", "i", EntityStatus::Running)).unwrap());
        assert!(store.put_entity_record(&record("e", "i", EntityStatus::Offloaded)).unwrap());

        let written = store
            .put_entity_record(&record("e", "i", EntityStatus::Error))
            .unwrap();
        assert!(!written);
        // Re-writing the terminal state itself is allowed.
        assert!(store.put_entity_record(&record("e", "i", EntityStatus::Offloaded)).unwrap());

        let stored = store.get_entity_record("e", "i").unwrap().unwrap();
        assert_eq!(stored.status, EntityStatus::Offloaded);
    }

    #[test]
    fn find_and_list_entity_records() {
        let store = tenant();
        store.put_entity_record(&record("e1", "i1", EntityStatus::Running)).unwrap();
        store.put_entity_record(&record("e1", "i2", EntityStatus::Running)).unwrap();
        store.put_entity_record(&record("e10", "i3", EntityStatus::Starting)).unwrap();

        assert_eq!(store.list_entity_records(Some("e1")).unwrap().len(), 2);
        assert_eq!(store.list_entity_records(None).unwrap().len(), 3);

        let found = store.find_entity_record("i3").unwrap().unwrap();
        assert_eq!(found.id, "e10");
        assert!(store.find_entity_record("i4").unwrap().is_none());

        assert!(store.remove_entity_record("e1", "i1").unwrap());
        assert_eq!(store.list_entity_records(Some("e1")).unwrap().len(), 1);
    }

    #[test]
    fn fdu_records_by_fdu() {
        let store = tenant();
        for (fdu, inst) in [("f1", "a"), ("f1", "b"), ("f2", "c")] {
            store
                .put_fdu_record(&FduRecord {
                    uuid: inst.to_string(),
                    fdu_id: fdu.to_string(),
                    status: FduState::Run,
                })
                .unwrap();
        }
        assert_eq!(store.list_fdu_records("f1").unwrap().len(), 2);
        assert!(store.remove_fdu_record("f1", "a").unwrap());
        assert_eq!(store.list_fdu_records("f1").unwrap().len(), 1);
        assert_eq!(store.list_fdu_records("f2").unwrap()[0].uuid, "c");
    }

    #[test]
    fn backend_bindings() {
        let store = tenant();
        store
            .put_fim_info(&FimInfo {
                uuid: "fim-1".to_string(),
                locator: "tcp/127.0.0.1:7447".to_string(),
            })
            .unwrap();
        store
            .put_cloud_info(&CloudInfo {
                uuid: "k8s".to_string(),
                config: "{}".to_string(),
            })
            .unwrap();

        assert_eq!(store.list_fim_infos().unwrap().len(), 1);
        assert!(store.get_cloud_info("k8s").unwrap().is_some());
        assert!(store.remove_fim_info("fim-1").unwrap());
        assert!(store.get_fim_info("fim-1").unwrap().is_none());
        assert!(store.remove_cloud_info("k8s").unwrap());
        assert!(store.list_cloud_infos().unwrap().is_empty());
    }

    #[test]
    fn closed_connector_rejects_calls() {
        let store = tenant();
        let clone = store.clone();
        store.close();

        assert!(clone.is_closed());
        assert!(matches!(clone.list_jobs(), Err(StateError::Closed(_))));
        assert!(matches!(
            clone.put_entity_record(&record("e", "i", EntityStatus::Running)),
            Err(StateError::Closed(_))
        ));
    }
}
