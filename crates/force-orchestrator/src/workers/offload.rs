//! Offloading: remove an entity descriptor from the tenant catalog.

use force_core::EntityAction;
use tracing::info;

use super::{JobRun, load_entity};
use crate::error::OrchestratorResult;

pub async fn run(run: &mut JobRun<'_>, action: EntityAction) -> OrchestratorResult<()> {
    let store = run.store();
    let entity = load_entity(store, &action.uuid)?;

    for fdu in &entity.fdus {
        store.remove_fdu(fdu.key())?;
    }
    for vl in &entity.virtual_links {
        store.remove_virtual_link(vl.key())?;
    }
    store.remove_entity(entity.key())?;

    info!(job_id = %run.job.job_id, entity_id = %entity.key(), "entity offloaded");
    Ok(())
}
