//! Job workers.
//!
//! Every worker runs inside a [`JobRun`]: the job is marked `running`
//! before the worker starts, every record update is mirrored into the
//! job, and the outcome decides the final job status. A failed worker
//! leaves the instance record in `ERROR` (`INVALID` when the descriptor
//! itself is at fault). Nothing is retried or rolled back here; the
//! monitoring loop repairs what it can.

pub mod instantiate;
pub mod monitor;
pub mod offload;
pub mod onboard;
pub mod recover;
pub mod teardown;

mod provision;

use std::sync::Arc;

use force_backend::{CloudClient, FimClient};
use force_core::{
    EntityDescriptor, EntityRecord, EntityStatus, FduDescriptor, Job, JobStatus,
    OrchestratorConfig,
};
use force_state::TenantStore;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::Orchestrator;
use crate::registry::TenantHandles;

/// A job being executed, with the tenant it runs for.
pub struct JobRun<'a> {
    pub(crate) orchestrator: &'a Orchestrator,
    pub system_id: String,
    pub tenant_id: String,
    handles: TenantHandles,
    pub job: Job,
    /// Last persisted state of the instance this job works on.
    record: Option<EntityRecord>,
}

impl<'a> JobRun<'a> {
    pub(crate) fn new(
        orchestrator: &'a Orchestrator,
        system_id: String,
        tenant_id: String,
        handles: TenantHandles,
        job: Job,
    ) -> Self {
        Self {
            orchestrator,
            system_id,
            tenant_id,
            handles,
            job,
            record: None,
        }
    }

    pub fn store(&self) -> &TenantStore {
        &self.handles.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.orchestrator.config()
    }

    /// Mark the job running.
    pub(crate) fn start(&mut self) -> OrchestratorResult<()> {
        self.job.status = JobStatus::Running;
        self.store().put_job(&self.job)?;
        info!(
            job_id = %self.job.job_id,
            kind = %self.job.payload.kind_name(),
            sender = %self.job.original_sender,
            "job started"
        );
        Ok(())
    }

    /// Persist the instance record and mirror it into the job.
    pub fn save(&mut self, record: &EntityRecord) -> OrchestratorResult<()> {
        let previous = self.record.as_ref().map(|r| r.status);
        if !self.store().put_entity_record(record)? {
            warn!(instance_id = %record.uuid, status = %record.status, "instance is offloaded, update dropped");
        } else if previous != Some(record.status) {
            info!(
                job_id = %self.job.job_id,
                instance_id = %record.uuid,
                status = %record.status,
                "instance status changed"
            );
        } else {
            debug!(instance_id = %record.uuid, "instance record saved");
        }
        self.record = Some(record.clone());
        self.job.record = Some(record.clone());
        self.store().put_job(&self.job)?;
        Ok(())
    }

    /// Set the status of a record and save it.
    pub fn set_status(
        &mut self,
        record: &mut EntityRecord,
        status: EntityStatus,
    ) -> OrchestratorResult<()> {
        record.status = status;
        self.save(record)
    }

    /// Remember a record the job looked at without writing it.
    pub fn observe(&mut self, record: &EntityRecord) {
        self.record = Some(record.clone());
        self.job.record = Some(record.clone());
    }

    /// Record the outcome of the worker.
    pub(crate) fn finish(mut self, outcome: OrchestratorResult<()>) {
        let job_id = self.job.job_id.clone();
        match outcome {
            Ok(()) => {
                self.job.status = JobStatus::Completed;
                info!(%job_id, kind = %self.job.payload.kind_name(), "job completed");
            }
            Err(e) => {
                error!(%job_id, kind = %self.job.payload.kind_name(), error = %e, "job failed");
                if let Some(mut record) = self.record.take() {
                    record.status = if e.marks_invalid() {
                        EntityStatus::Invalid
                    } else {
                        EntityStatus::Error
                    };
                    match self.store().put_entity_record(&record) {
                        Ok(true) => {
                            info!(%job_id, instance_id = %record.uuid, status = %record.status, "instance status changed")
                        }
                        Ok(false) => {}
                        Err(e) => {
                            error!(%job_id, instance_id = %record.uuid, error = %e, "failed to save instance")
                        }
                    }
                    self.job.record = Some(record);
                }
                self.job.status = JobStatus::Failed;
                self.job.error = Some(e.to_string());
            }
        }
        if let Err(e) = self.store().put_job(&self.job) {
            error!(%job_id, error = %e, "failed to persist job outcome");
        }
    }

    // ── Backends ───────────────────────────────────────────────────

    pub fn fim(&self, fim_id: Option<&str>, target: &str) -> OrchestratorResult<Arc<dyn FimClient>> {
        let fim_id = fim_id.ok_or_else(|| OrchestratorError::MissingFim(target.to_string()))?;
        Ok(self.handles.fim(fim_id)?)
    }

    pub fn cloud(
        &self,
        cloud_id: Option<&str>,
        target: &str,
    ) -> OrchestratorResult<Arc<dyn CloudClient>> {
        let cloud_id =
            cloud_id.ok_or_else(|| OrchestratorError::MissingCloud(target.to_string()))?;
        Ok(self.handles.cloud(cloud_id)?)
    }
}

// ── Catalog helpers ───────────────────────────────────────────────

pub(crate) fn load_entity(
    store: &TenantStore,
    entity_id: &str,
) -> OrchestratorResult<EntityDescriptor> {
    store
        .get_entity(entity_id)?
        .ok_or_else(|| OrchestratorError::EntityNotFound(entity_id.to_string()))
}

pub(crate) fn load_instance(
    store: &TenantStore,
    instance_id: &str,
) -> OrchestratorResult<EntityRecord> {
    store
        .find_entity_record(instance_id)?
        .ok_or_else(|| OrchestratorError::InstanceNotFound(instance_id.to_string()))
}

/// The FDU descriptor an FDU instance was created from, found through
/// the FDU records of the catalog FDUs.
pub(crate) fn fdu_for_instance(
    store: &TenantStore,
    fdus: &[FduDescriptor],
    instance_id: &str,
) -> OrchestratorResult<FduDescriptor> {
    for fdu in fdus {
        if store
            .list_fdu_records(fdu.key())?
            .iter()
            .any(|record| record.uuid == instance_id)
        {
            return Ok(fdu.clone());
        }
    }
    Err(OrchestratorError::FduNotFound(instance_id.to_string()))
}
