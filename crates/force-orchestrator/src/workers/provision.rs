//! Backend steps shared by instantiate and recovery.

use force_backend::{FimClient, FimInstance};
use force_core::{FduState, OrchestratorConfig, VirtualLinkDescriptor};
use tracing::info;

use crate::converge::{wait_for_instance, wait_for_network};
use crate::convert::to_virtual_network;
use crate::error::OrchestratorResult;
use crate::selector::select_node;

/// Create the FIM network of a virtual link and wait until it is
/// visible. Returns the network id.
pub(crate) async fn create_network(
    fim: &dyn FimClient,
    vl: &VirtualLinkDescriptor,
    config: &OrchestratorConfig,
) -> OrchestratorResult<String> {
    let network = to_virtual_network(vl)?;
    let net_id = network.uuid.clone();
    fim.network_add(network).await?;
    wait_for_network(fim, &net_id, config).await?;
    info!(%net_id, virtual_link = %vl.key(), "virtual network created");
    Ok(net_id)
}

/// Place, define, configure and start one instance of an onboarded FDU.
pub(crate) async fn start_replica(
    fim: &dyn FimClient,
    fdu_id: &str,
    config: &OrchestratorConfig,
) -> OrchestratorResult<FimInstance> {
    let node = select_node(fim, fdu_id).await?;

    let defined = fim.fdu_define(&node, fdu_id).await?;
    let instance_id = defined.uuid;
    wait_for_instance(fim, &instance_id, &[FduState::Define], config).await?;

    fim.fdu_configure(&instance_id).await?;
    wait_for_instance(fim, &instance_id, &[FduState::Configure], config).await?;

    fim.fdu_start(&instance_id).await?;
    let instance =
        wait_for_instance(fim, &instance_id, &[FduState::Run, FduState::Starting], config).await?;

    info!(%fdu_id, %instance_id, %node, status = ?instance.status, "FDU instance started");
    Ok(instance)
}
