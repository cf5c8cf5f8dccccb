//! Instantiation: create a running instance of an onboarded entity.
//!
//! Networks first, then the FDUs in dependency order. Cloud FDUs become
//! Kubernetes Deployments; every other FDU is onboarded into the FIM
//! catalog and started `max(1, replicas)` times. The record is saved
//! after every step so a failure leaves an accurate picture behind.

use force_backend::Deployment;
use force_core::{
    EntityAction, EntityDescriptor, EntityRecord, EntityStatus, FduDescriptor, FduRecord,
    FduState, new_id,
};
use tracing::info;

use super::{JobRun, load_entity, provision};
use crate::convert::to_fim_fdu;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ordering::deployment_order;

pub async fn run(run: &mut JobRun<'_>, action: EntityAction) -> OrchestratorResult<()> {
    let entity = load_entity(run.store(), &action.uuid)?;

    let instance_id = new_id();
    let mut record = EntityRecord::new(
        entity.key(),
        &instance_id,
        action.fim_id.clone(),
        action.cloud_id.clone(),
    );
    run.save(&record)?;

    if !entity.virtual_links.is_empty() {
        let fim = run.fim(action.fim_id.as_deref(), "virtual links")?;
        for vl in &entity.virtual_links {
            let net_id = provision::create_network(&*fim, vl, run.config()).await?;
            record.virtual_links.push(net_id);
            run.save(&record)?;
        }
    }

    for fdu in deployment_order(&entity.fdus)? {
        if fdu.hypervisor.is_cloud() {
            deploy_cloud_fdu(run, &mut record, &fdu).await?;
        } else {
            deploy_fim_fdu(run, &mut record, &entity, &fdu).await?;
        }
    }

    run.set_status(&mut record, EntityStatus::Starting)?;
    info!(
        job_id = %run.job.job_id,
        entity_id = %entity.key(),
        %instance_id,
        fdu_instances = record.fdus.len(),
        "entity instantiated"
    );

    run.orchestrator
        .start_monitoring(&run.system_id, &run.tenant_id, &record)
        .await;
    Ok(())
}

async fn deploy_cloud_fdu(
    run: &mut JobRun<'_>,
    record: &mut EntityRecord,
    fdu: &FduDescriptor,
) -> OrchestratorResult<()> {
    let cloud = run.cloud(record.cloud_id.as_deref(), &format!("cloud FDU {}", fdu.id))?;
    let blob = fdu.hypervisor_specific.as_deref().ok_or_else(|| {
        OrchestratorError::InvalidDescriptor(format!("cloud FDU {} has no deployment", fdu.id))
    })?;
    let mut deployment = Deployment::from_encoded(blob)
        .map_err(|e| OrchestratorError::InvalidDescriptor(format!("FDU {}: {e}", fdu.id)))?;
    deployment.metadata.name = new_id();

    let namespace = run.config().cloud_namespace.clone();
    let created = cloud.create_deployment(&namespace, deployment).await?;
    let name = created.metadata.name;

    run.store().put_fdu_record(&FduRecord {
        uuid: name.clone(),
        fdu_id: fdu.key().to_string(),
        status: FduState::Starting,
    })?;
    record.fdus.push(name.clone());
    run.save(record)?;
    info!(fdu_id = %fdu.key(), deployment = %name, %namespace, "cloud FDU deployed");
    Ok(())
}

async fn deploy_fim_fdu(
    run: &mut JobRun<'_>,
    record: &mut EntityRecord,
    entity: &EntityDescriptor,
    fdu: &FduDescriptor,
) -> OrchestratorResult<()> {
    let fim = run.fim(record.fim_id.as_deref(), &format!("FDU {}", fdu.id))?;
    let fim_fdu = to_fim_fdu(fdu, entity, &*fim, &record.virtual_links).await?;
    let fdu_id = fim_fdu.uuid.clone();
    fim.fdu_onboard(fim_fdu).await?;

    if record.status != EntityStatus::Starting {
        run.set_status(record, EntityStatus::Starting)?;
    }

    for _ in 0..fdu.min_replicas() {
        let instance = provision::start_replica(&*fim, &fdu_id, run.config()).await?;
        run.store().put_fdu_record(&FduRecord {
            uuid: instance.uuid.clone(),
            fdu_id: fdu_id.clone(),
            status: instance.status,
        })?;
        record.fdus.push(instance.uuid);
        run.save(record)?;
    }
    Ok(())
}
