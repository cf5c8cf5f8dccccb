//! Onboarding: register an entity descriptor in the tenant catalog.

use force_core::{EntityDescriptor, JobPayload};
use tracing::info;

use super::JobRun;
use crate::error::OrchestratorResult;

/// Assign missing UUIDs, then store the FDUs and virtual links before
/// the entity that refers to them. The job keeps the descriptor with
/// its UUIDs filled in.
pub async fn run(run: &mut JobRun<'_>, mut descriptor: EntityDescriptor) -> OrchestratorResult<()> {
    descriptor.assign_uuids();

    let store = run.store();
    for fdu in &descriptor.fdus {
        store.put_fdu(fdu)?;
    }
    for vl in &descriptor.virtual_links {
        store.put_virtual_link(vl)?;
    }
    store.put_entity(&descriptor)?;

    info!(
        job_id = %run.job.job_id,
        entity_id = %descriptor.key(),
        fdus = descriptor.fdus.len(),
        virtual_links = descriptor.virtual_links.len(),
        "entity onboarded"
    );
    run.job.payload = JobPayload::Onboard(descriptor);
    Ok(())
}
