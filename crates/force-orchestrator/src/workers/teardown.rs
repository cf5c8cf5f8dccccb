//! Teardown: stop an entity instance and release its backend resources.

use std::sync::Arc;

use force_backend::FimClient;
use force_core::{EntityAction, EntityRecord, EntityStatus};
use tracing::{info, warn};

use super::{JobRun, fdu_for_instance, load_entity, load_instance};
use crate::error::OrchestratorResult;

pub async fn run(run: &mut JobRun<'_>, action: EntityAction) -> OrchestratorResult<()> {
    let mut record = load_instance(run.store(), &action.uuid)?;
    if record.status == EntityStatus::Offloaded {
        info!(job_id = %run.job.job_id, instance_id = %record.uuid, "instance already offloaded");
        run.observe(&record);
        return Ok(());
    }

    run.orchestrator.spawner().stop(&record.uuid).await;
    if let Err(e) = release(run, &mut record).await {
        // The instance is still there; keep checking on it.
        warn!(job_id = %run.job.job_id, instance_id = %record.uuid, error = %e, "teardown failed, monitoring resumed");
        run.orchestrator
            .start_monitoring(&run.system_id, &run.tenant_id, &record)
            .await;
        return Err(e);
    }
    info!(job_id = %run.job.job_id, instance_id = %record.uuid, "instance torn down");
    Ok(())
}

async fn release(run: &mut JobRun<'_>, record: &mut EntityRecord) -> OrchestratorResult<()> {
    run.set_status(record, EntityStatus::Stopping)?;

    let entity = load_entity(run.store(), &record.id)?;
    let catalog_fdus = run.store().list_fdus()?;

    for instance_id in record.fdus.clone() {
        let fdu = fdu_for_instance(run.store(), &catalog_fdus, &instance_id)?;
        if fdu.hypervisor.is_cloud() {
            let cloud = run.cloud(record.cloud_id.as_deref(), &format!("cloud FDU {}", fdu.id))?;
            let namespace = &run.config().cloud_namespace;
            match cloud.delete_deployment(namespace, &instance_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(deployment = %instance_id, "deployment already gone");
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let fim = run.fim(record.fim_id.as_deref(), &format!("FDU {}", fdu.id))?;
            if let Err(e) = fim.fdu_stop(&instance_id).await {
                warn!(%instance_id, error = %e, "stop failed, instance may not be running");
            }
            if let Err(e) = fim.fdu_clean(&instance_id).await {
                warn!(%instance_id, error = %e, "clean failed");
            }
            match fim.fdu_undefine(&instance_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(%instance_id, "instance already undefined");
                }
                Err(e) => return Err(e.into()),
            }
        }

        run.store().remove_fdu_record(fdu.key(), &instance_id)?;
        record.fdus.retain(|id| id != &instance_id);
        run.save(record)?;
    }

    run.set_status(record, EntityStatus::Offloading)?;

    let fim_fdus: Vec<_> = entity
        .fdus
        .iter()
        .filter(|fdu| !fdu.hypervisor.is_cloud())
        .collect();
    if !fim_fdus.is_empty() || !record.virtual_links.is_empty() {
        let fim = run.fim(record.fim_id.as_deref(), &format!("instance {}", record.uuid))?;
        for fdu in fim_fdus {
            if let Err(e) = fim.fdu_offload(fdu.key()).await {
                warn!(fdu_id = %fdu.key(), error = %e, "failed to offload FDU from FIM");
            }
        }
        remove_networks(&fim, &record.virtual_links).await;
    }

    run.set_status(record, EntityStatus::Offloaded)
}

/// Detach each network from every node, then delete it. Best effort.
async fn remove_networks(fim: &Arc<dyn FimClient>, net_ids: &[String]) {
    if net_ids.is_empty() {
        return;
    }
    let nodes = match fim.node_list().await {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!(error = %e, "failed to list FIM nodes");
            Vec::new()
        }
    };
    for net_id in net_ids {
        for node in &nodes {
            if let Err(e) = fim.network_remove_from_node(node, net_id).await {
                warn!(%net_id, %node, error = %e, "failed to remove network from node");
            }
        }
        if let Err(e) = fim.network_remove(net_id).await {
            warn!(%net_id, error = %e, "failed to remove network");
        }
    }
}
