//! Monitoring: compare an instance with what its backends report.
//!
//! FIM instances are classified by state: `RUN` is healthy, `DEFINE`,
//! `CONFIGURE` and `STARTING` are on their way, `ERROR` and `PAUSE` are
//! broken and get pruned from the record. An FDU left with fewer
//! instances than its replica minimum puts the record in `ERROR` and
//! triggers a recovery. Cloud FDUs are only observed; Kubernetes heals
//! its own Deployments.

use force_core::{EntityAction, EntityStatus, FduHealth, FduRecord, FduState};
use tracing::{debug, info, warn};

use super::{JobRun, load_entity, load_instance};
use crate::error::OrchestratorResult;

pub async fn run(run: &mut JobRun<'_>, action: EntityAction) -> OrchestratorResult<()> {
    let mut record = load_instance(run.store(), &action.uuid)?;
    if !record.status.is_reconcilable() || record.status == EntityStatus::Recovering {
        debug!(instance_id = %record.uuid, status = %record.status, "instance not monitored in this state");
        return Ok(());
    }
    run.observe(&record);

    let entity = load_entity(run.store(), &record.id)?;
    let mut ready = true;
    let mut deficit = false;
    let mut pruned = 0;

    for fdu in &entity.fdus {
        let known: Vec<FduRecord> = run
            .store()
            .list_fdu_records(fdu.key())?
            .into_iter()
            .filter(|r| record.fdus.contains(&r.uuid))
            .collect();

        if fdu.hypervisor.is_cloud() {
            if known.is_empty() {
                ready = false;
                continue;
            }
            let cloud = run.cloud(record.cloud_id.as_deref(), &format!("cloud FDU {}", fdu.id))?;
            for mut fdu_record in known {
                let state = cloud
                    .get_deployment(&run.config().cloud_namespace, &fdu_record.uuid)
                    .await?;
                if state.is_available() {
                    fdu_record.status = FduState::Run;
                } else {
                    ready = false;
                    fdu_record.status = FduState::Starting;
                    debug!(
                        deployment = %fdu_record.uuid,
                        available = state.status.available_replicas,
                        desired = state.deployment.desired_replicas(),
                        "deployment not available yet"
                    );
                }
                run.store().put_fdu_record(&fdu_record)?;
            }
            continue;
        }

        let fim = run.fim(record.fim_id.as_deref(), &format!("FDU {}", fdu.id))?;
        let mut alive = 0;
        for mut fdu_record in known {
            let health = match fim.instance_info(&fdu_record.uuid).await {
                Ok(instance) => {
                    fdu_record.status = instance.status;
                    instance.status.health()
                }
                Err(e) if e.is_not_found() => {
                    warn!(instance_id = %fdu_record.uuid, "FDU instance vanished");
                    FduHealth::Unhealthy
                }
                Err(e) => return Err(e.into()),
            };

            match health {
                FduHealth::Healthy => {
                    alive += 1;
                    run.store().put_fdu_record(&fdu_record)?;
                }
                FduHealth::Transitional | FduHealth::Unknown => {
                    ready = false;
                    alive += 1;
                    run.store().put_fdu_record(&fdu_record)?;
                }
                FduHealth::Unhealthy => {
                    ready = false;
                    pruned += 1;
                    warn!(
                        instance_id = %fdu_record.uuid,
                        status = ?fdu_record.status,
                        "pruning unhealthy FDU instance"
                    );
                    run.store().remove_fdu_record(fdu.key(), &fdu_record.uuid)?;
                    record.fdus.retain(|id| id != &fdu_record.uuid);
                }
            }
        }

        if alive < fdu.min_replicas() {
            deficit = true;
            warn!(
                instance_id = %record.uuid,
                fdu_id = %fdu.key(),
                alive,
                wanted = fdu.min_replicas(),
                "FDU below its replica minimum"
            );
        }
    }

    if deficit {
        run.set_status(&mut record, EntityStatus::Error)?;
        run.orchestrator
            .spawn_recovery(&run.system_id, &run.tenant_id, &record.uuid);
    } else if ready {
        run.set_status(&mut record, EntityStatus::Running)?;
    } else if pruned > 0 {
        run.save(&record)?;
    }

    info!(
        job_id = %run.job.job_id,
        instance_id = %record.uuid,
        status = %record.status,
        ready,
        pruned,
        "instance checked"
    );
    Ok(())
}
