//! Orchestrator — job intake, dispatch and the catalog queries.
//!
//! `insert_new_job` persists a job and offers it to the bounded queue;
//! the dispatch loop started by [`Orchestrator::start`] hands each job to
//! its own task. Lifecycle jobs run with the registry locked for their
//! whole duration, so at most one of them makes progress at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use force_backend::{BackendFactory, CloudCredentials};
use force_core::{
    DEFAULT_UUID, EntityAction, EntityDescriptor, EntityRecord, EntityStatus, Job, JobKind,
    JobPayload, JobStatus, OrchestratorConfig, ReplyNewJobMessage, RequestNewJobMessage, new_id,
};
use force_state::StateStore;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::queue::{EnqueuedJob, JobQueue};
use crate::registry::Registry;
use crate::spawner::{MonitorSpawner, Tick, TickFn, TickFuture};
use crate::workers::{self, JobRun};

/// Sender recorded on the monitoring jobs the spawner submits.
pub const MONITORING_SENDER: &str = "monitoring-spawner";

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    config: Arc<OrchestratorConfig>,
    queue: JobQueue,
    receiver: Arc<Mutex<Option<mpsc::Receiver<EnqueuedJob>>>>,
    spawner: MonitorSpawner,
    /// Instances with a recovery in flight.
    recoveries: Arc<Mutex<HashSet<String>>>,
    limiter: Option<Arc<Semaphore>>,
}

impl Orchestrator {
    /// Build an orchestrator with the default system (and its default
    /// tenant) registered.
    pub async fn new(
        config: OrchestratorConfig,
        store: StateStore,
        backends: Arc<dyn BackendFactory>,
    ) -> OrchestratorResult<Self> {
        let registry = Arc::new(Registry::new(store, backends));
        registry.add_system(DEFAULT_UUID).await?;

        let (queue, receiver) = JobQueue::new(config.queue_capacity);
        let limiter = config
            .max_concurrent_workers
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        Ok(Self {
            registry,
            config: Arc::new(config),
            queue,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            spawner: MonitorSpawner::new(),
            recoveries: Arc::new(Mutex::new(HashSet::new())),
            limiter,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn spawner(&self) -> &MonitorSpawner {
        &self.spawner
    }

    /// Rebuild in-memory state from the default tenant's store: FIM and
    /// cloud bindings, monitoring for every live instance, and the jobs
    /// still waiting in the queue.
    pub async fn restore(&self) -> OrchestratorResult<()> {
        let store = self.registry.tenant_store(DEFAULT_UUID, DEFAULT_UUID).await?;

        for fim in store.list_fim_infos()? {
            if let Err(e) = self
                .registry
                .add_fim(DEFAULT_UUID, DEFAULT_UUID, &fim.uuid, &fim.locator)
                .await
            {
                warn!(fim_id = %fim.uuid, error = %e, "failed to restore FIM");
            }
        }

        for cloud in store.list_cloud_infos()? {
            let restored = match CloudCredentials::from_json(&cloud.config) {
                Ok(credentials) => self
                    .registry
                    .add_cloud_credentials(DEFAULT_UUID, DEFAULT_UUID, &cloud.uuid, credentials)
                    .await
                    .map_err(OrchestratorError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = restored {
                warn!(cloud_id = %cloud.uuid, error = %e, "failed to restore cloud");
            }
        }

        let mut monitored = 0;
        for record in store.list_entity_records(None)? {
            if record.status == EntityStatus::Offloaded {
                continue;
            }
            self.start_monitoring(DEFAULT_UUID, DEFAULT_UUID, &record).await;
            monitored += 1;
        }

        let mut requeued = 0;
        for job in store.list_jobs()? {
            if job.status != JobStatus::Queued {
                continue;
            }
            let job_id = job.job_id.clone();
            let queued = EnqueuedJob {
                job,
                system_id: DEFAULT_UUID.to_string(),
                tenant_id: DEFAULT_UUID.to_string(),
            };
            if self.queue.try_enqueue(queued).is_err() {
                warn!(%job_id, "queue full, restored job left queued in the store");
            } else {
                requeued += 1;
            }
        }

        info!(monitored, requeued, "orchestrator state restored");
        Ok(())
    }

    // ── Job intake ─────────────────────────────────────────────────

    /// Accept a job request. The reply says `accepted = false` when the
    /// queue is full; the job is then not kept.
    pub async fn insert_new_job(
        &self,
        system_id: &str,
        tenant_id: &str,
        request: RequestNewJobMessage,
    ) -> OrchestratorResult<ReplyNewJobMessage> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;

        let payload = JobPayload::decode(&request.job_kind, &request.body);
        let job = Job::queued(new_id(), request.sender.clone(), payload);
        let job_id = job.job_id.clone();
        store.put_job(&job)?;

        let queued = EnqueuedJob {
            job,
            system_id: system_id.to_string(),
            tenant_id: tenant_id.to_string(),
        };
        let accepted = match self.queue.try_enqueue(queued) {
            Ok(()) => {
                debug!(%job_id, kind = %request.job_kind, "job queued");
                true
            }
            Err(_) => {
                store.remove_job(&job_id)?;
                warn!(%job_id, kind = %request.job_kind, "job queue full, request rejected");
                false
            }
        };

        Ok(ReplyNewJobMessage {
            original_sender: request.sender,
            job_id,
            accepted,
        })
    }

    // ── Dispatch ───────────────────────────────────────────────────

    /// Start the dispatch loop. It runs until `shutdown` flips or every
    /// queue sender is gone. Only the first call gets the queue.
    pub fn start(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let Some(mut receiver) = receiver else {
                warn!("dispatch loop already started");
                return;
            };
            info!("dispatch loop started");
            loop {
                tokio::select! {
                    next = receiver.recv() => match next {
                        Some(queued) => orchestrator.dispatch(queued),
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
            info!("dispatch loop stopped");
        })
    }

    fn dispatch(&self, queued: EnqueuedJob) {
        let orchestrator = self.clone();
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            orchestrator.execute(queued).await;
        });
    }

    /// Run one job to completion on the current task.
    pub async fn execute(&self, queued: EnqueuedJob) {
        let EnqueuedJob {
            job,
            system_id,
            tenant_id,
        } = queued;
        let job_id = job.job_id.clone();

        // Lifecycle and reconciliation jobs own the registry while they run.
        let exclusive = !matches!(
            job.payload.kind(),
            None | Some(JobKind::Test)
        );
        let guard = if exclusive {
            Some(self.registry.lock_exclusive().await)
        } else {
            None
        };
        let handles = match &guard {
            Some(systems) => systems.tenant(&system_id, &tenant_id).cloned(),
            None => self.registry.tenant_handles(&system_id, &tenant_id).await,
        };
        let handles = match handles {
            Ok(handles) => handles,
            Err(e) => {
                error!(%job_id, %system_id, %tenant_id, error = %e, "job tenant is gone");
                return;
            }
        };

        let mut run = JobRun::new(self, system_id, tenant_id, handles, job);
        if let Err(e) = run.start() {
            error!(%job_id, error = %e, "failed to mark job running");
            return;
        }

        let outcome = match run.job.payload.clone() {
            JobPayload::Test => workers::test::run(&mut run).await,
            JobPayload::Onboard(descriptor) => workers::onboard::run(&mut run, descriptor).await,
            JobPayload::Offload(action) => workers::offload::run(&mut run, action).await,
            JobPayload::Instantiate(action) => workers::instantiate::run(&mut run, action).await,
            JobPayload::Teardown(action) => workers::teardown::run(&mut run, action).await,
            JobPayload::Monitoring(action) => workers::monitor::run(&mut run, action).await,
            JobPayload::Unrecognized { reason, .. } => Err(OrchestratorError::Decode(reason)),
        };
        run.finish(outcome);
        drop(guard);
    }

    // ── Monitoring & recovery ──────────────────────────────────────

    /// Start (or restart) the monitoring spawner of an instance.
    pub(crate) async fn start_monitoring(
        &self,
        system_id: &str,
        tenant_id: &str,
        record: &EntityRecord,
    ) {
        let orchestrator = self.clone();
        let system_id = system_id.to_string();
        let tenant_id = tenant_id.to_string();
        let action = EntityAction {
            uuid: record.uuid.clone(),
            fim_id: record.fim_id.clone(),
            cloud_id: record.cloud_id.clone(),
        };
        let tick: TickFn = Arc::new(move || -> TickFuture {
            let orchestrator = orchestrator.clone();
            let system_id = system_id.clone();
            let tenant_id = tenant_id.clone();
            let action = action.clone();
            Box::pin(async move {
                orchestrator
                    .monitoring_tick(&system_id, &tenant_id, action)
                    .await
            })
        });
        self.spawner
            .start(&record.uuid, self.config.monitor_interval, tick)
            .await;
    }

    async fn monitoring_tick(&self, system_id: &str, tenant_id: &str, action: EntityAction) -> Tick {
        let instance_id = action.uuid.clone();
        let store = match self.registry.tenant_store(system_id, tenant_id).await {
            Ok(store) => store,
            Err(e) => {
                info!(%instance_id, error = %e, "tenant gone, monitoring ends");
                return Tick::Stop;
            }
        };
        match store.find_entity_record(&instance_id) {
            Ok(Some(record)) if record.status != EntityStatus::Offloaded => {}
            Ok(_) => {
                info!(%instance_id, "instance offloaded, monitoring ends");
                return Tick::Stop;
            }
            Err(e) => {
                warn!(%instance_id, error = %e, "cannot read instance, monitoring ends");
                return Tick::Stop;
            }
        }

        let body = match serde_json::to_string(&action) {
            Ok(body) => body,
            Err(e) => {
                error!(%instance_id, error = %e, "cannot encode monitoring job");
                return Tick::Stop;
            }
        };
        let request = RequestNewJobMessage {
            sender: MONITORING_SENDER.to_string(),
            job_kind: JobKind::Monitoring.as_str().to_string(),
            body,
        };
        match self.insert_new_job(system_id, tenant_id, request).await {
            Ok(reply) if reply.accepted => {
                debug!(%instance_id, job_id = %reply.job_id, "monitoring job submitted");
            }
            Ok(_) => warn!(%instance_id, "job queue full, monitoring tick skipped"),
            Err(e) => warn!(%instance_id, error = %e, "failed to submit monitoring job"),
        }
        Tick::Continue
    }

    pub async fn is_monitoring(&self, instance_id: &str) -> bool {
        self.spawner.is_monitoring(instance_id).await
    }

    pub async fn monitored_instances(&self) -> Vec<String> {
        self.spawner.active().await
    }

    /// Launch a recovery for an instance unless one is already running.
    pub(crate) fn spawn_recovery(&self, system_id: &str, tenant_id: &str, instance_id: &str) {
        let fresh = self
            .recoveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance_id.to_string());
        if !fresh {
            debug!(%instance_id, "recovery already in flight");
            return;
        }

        let orchestrator = self.clone();
        let system_id = system_id.to_string();
        let tenant_id = tenant_id.to_string();
        let instance_id = instance_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = orchestrator
                .recover(&system_id, &tenant_id, &instance_id)
                .await
            {
                warn!(%instance_id, error = %e, "recovery failed");
            }
            orchestrator
                .recoveries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&instance_id);
        });
    }

    /// Bring an instance back to its declared replica counts. Runs with
    /// the registry locked, like a lifecycle job.
    pub async fn recover(
        &self,
        system_id: &str,
        tenant_id: &str,
        instance_id: &str,
    ) -> OrchestratorResult<EntityRecord> {
        let systems = self.registry.lock_exclusive().await;
        let handles = systems.tenant(system_id, tenant_id)?.clone();
        let record = workers::recover::run(&handles, &self.config, instance_id).await;
        drop(systems);
        record
    }

    pub fn recovery_in_flight(&self, instance_id: &str) -> bool {
        self.recoveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(instance_id)
    }

    /// Stop every monitoring spawner.
    pub async fn shutdown(&self) {
        self.spawner.stop_all().await;
        info!("orchestrator shut down");
    }

    // ── Catalog queries ────────────────────────────────────────────

    pub async fn get_job(
        &self,
        system_id: &str,
        tenant_id: &str,
        job_id: &str,
    ) -> OrchestratorResult<Job> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        store
            .get_job(job_id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))
    }

    /// UUIDs of the onboarded entities.
    pub async fn get_entities(
        &self,
        system_id: &str,
        tenant_id: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        Ok(store
            .list_entities()?
            .iter()
            .map(|entity| entity.key().to_string())
            .collect())
    }

    pub async fn get_entity(
        &self,
        system_id: &str,
        tenant_id: &str,
        entity_id: &str,
    ) -> OrchestratorResult<EntityDescriptor> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        store
            .get_entity(entity_id)?
            .ok_or_else(|| OrchestratorError::EntityNotFound(entity_id.to_string()))
    }

    /// Instance UUIDs of one entity.
    pub async fn get_entity_instances(
        &self,
        system_id: &str,
        tenant_id: &str,
        entity_id: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        Ok(store
            .list_entity_records(Some(entity_id))?
            .into_iter()
            .map(|record| record.uuid)
            .collect())
    }

    pub async fn get_entity_instance(
        &self,
        system_id: &str,
        tenant_id: &str,
        entity_id: &str,
        instance_id: &str,
    ) -> OrchestratorResult<EntityRecord> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        store
            .get_entity_record(entity_id, instance_id)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(instance_id.to_string()))
    }

    /// Look an instance up without knowing its entity.
    pub async fn find_entity_instance(
        &self,
        system_id: &str,
        tenant_id: &str,
        instance_id: &str,
    ) -> OrchestratorResult<EntityRecord> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        store
            .find_entity_record(instance_id)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(instance_id.to_string()))
    }

    /// Instance UUIDs of every entity.
    pub async fn get_instances(
        &self,
        system_id: &str,
        tenant_id: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let store = self.registry.tenant_store(system_id, tenant_id).await?;
        Ok(store
            .list_entity_records(None)?
            .into_iter()
            .map(|record| record.uuid)
            .collect())
    }
}
