//! Recovery: bring a damaged instance back to its declared shape.
//!
//! Missing networks are recreated, and every FIM FDU below its replica
//! minimum gets new instances. The record is saved after each new
//! replica, so a recovery that fails halfway is picked up by the next
//! monitoring round. Cloud FDUs are left to Kubernetes.

use std::collections::HashSet;

use force_core::{EntityRecord, EntityStatus, FduRecord, FduState, OrchestratorConfig};
use force_state::TenantStore;
use tracing::{info, warn};

use super::{load_entity, load_instance, provision};
use crate::convert::{networks_named, to_fim_fdu};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::registry::TenantHandles;

pub async fn run(
    handles: &TenantHandles,
    config: &OrchestratorConfig,
    instance_id: &str,
) -> OrchestratorResult<EntityRecord> {
    let store = &handles.store;
    let mut record = load_instance(store, instance_id)?;
    if !record.status.is_reconcilable() {
        info!(%instance_id, status = %record.status, "instance not recoverable in this state");
        return Ok(record);
    }

    record.status = EntityStatus::Recovering;
    if !store.put_entity_record(&record)? {
        return Ok(record);
    }
    info!(%instance_id, "recovery started");

    match restore(handles, config, &mut record).await {
        Ok(()) => {
            record.status = EntityStatus::Starting;
            store.put_entity_record(&record)?;
            info!(%instance_id, fdu_instances = record.fdus.len(), "recovery finished");
            Ok(record)
        }
        Err(e) => {
            record.status = EntityStatus::Error;
            if let Err(save_err) = store.put_entity_record(&record) {
                warn!(%instance_id, error = %save_err, "failed to save instance");
            }
            Err(e)
        }
    }
}

async fn restore(
    handles: &TenantHandles,
    config: &OrchestratorConfig,
    record: &mut EntityRecord,
) -> OrchestratorResult<()> {
    let store = &handles.store;
    let entity = load_entity(store, &record.id)?;

    let needs_fim = !entity.virtual_links.is_empty()
        || entity.fdus.iter().any(|fdu| !fdu.hypervisor.is_cloud());
    if !needs_fim {
        return Ok(());
    }
    let fim_id = record
        .fim_id
        .clone()
        .ok_or_else(|| OrchestratorError::MissingFim(format!("instance {}", record.uuid)))?;
    let fim = handles.fim(&fim_id)?;

    for vl in &entity.virtual_links {
        let existing = networks_named(&*fim, vl.key()).await?;
        if existing.iter().any(|id| record.virtual_links.contains(id)) {
            continue;
        }
        warn!(instance_id = %record.uuid, virtual_link = %vl.key(), "virtual network missing");
        let net_id = provision::create_network(&*fim, vl, config).await?;
        record.virtual_links.push(net_id);
        store.put_entity_record(record)?;
    }

    for fdu in entity.fdus.iter().filter(|fdu| !fdu.hypervisor.is_cloud()) {
        let listed: HashSet<String> = fim
            .instance_list(fdu.key())
            .await?
            .into_values()
            .flatten()
            .collect();
        let mut alive = record.fdus.iter().filter(|id| listed.contains(*id)).count();
        let wanted = fdu.min_replicas();
        if alive >= wanted {
            continue;
        }

        if alive == 0 {
            let fim_fdu = to_fim_fdu(fdu, &entity, &*fim, &record.virtual_links).await?;
            fim.fdu_onboard(fim_fdu).await?;
            info!(fdu_id = %fdu.key(), "FDU onboarded again");
        }
        let fdu_id = fim.fdu_info(fdu.key()).await?.uuid;

        while alive < wanted {
            let instance = provision::start_replica(&*fim, &fdu_id, config).await?;
            add_replica(store, record, &fdu_id, instance.uuid, instance.status)?;
            alive += 1;
        }
        info!(instance_id = %record.uuid, fdu_id = %fdu_id, replicas = wanted, "FDU replicas restored");
    }
    Ok(())
}

fn add_replica(
    store: &TenantStore,
    record: &mut EntityRecord,
    fdu_id: &str,
    instance_id: String,
    status: FduState,
) -> OrchestratorResult<()> {
    store.put_fdu_record(&FduRecord {
        uuid: instance_id.clone(),
        fdu_id: fdu_id.to_string(),
        status,
    })?;
    record.fdus.push(instance_id);
    store.put_entity_record(record)?;
    Ok(())
}

