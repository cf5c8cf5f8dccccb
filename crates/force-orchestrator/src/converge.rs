//! Waiting for backend resources to reach a state.
//!
//! Backends apply requests asynchronously. Rather than sleeping a fixed
//! time between steps, workers poll until the resource is observed in
//! the expected state or `convergence_timeout` runs out.

use std::future::Future;
use std::time::Duration;

use force_backend::{FimClient, FimInstance, VirtualNetwork};
use force_core::{FduState, OrchestratorConfig};
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Poll `check` every `every` until it yields a value, up to `timeout`.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    every: Duration,
    mut check: F,
) -> OrchestratorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OrchestratorResult<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(OrchestratorError::Timeout {
                what: what.to_string(),
                after: timeout,
            });
        }
        trace!(%what, "not converged yet");
        sleep(every).await;
    }
}

/// Wait until a freshly added network is visible on the FIM.
pub async fn wait_for_network(
    fim: &dyn FimClient,
    net_id: &str,
    config: &OrchestratorConfig,
) -> OrchestratorResult<VirtualNetwork> {
    poll_until(
        &format!("network {net_id}"),
        config.convergence_timeout,
        config.convergence_poll,
        || async move {
            match fim.network_get(net_id).await {
                Ok(net) => Ok(Some(net)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            }
        },
    )
    .await
}

/// Wait until an instance reports one of `accept`. An instance in
/// `ERROR` fails right away.
pub async fn wait_for_instance(
    fim: &dyn FimClient,
    instance_id: &str,
    accept: &[FduState],
    config: &OrchestratorConfig,
) -> OrchestratorResult<FimInstance> {
    poll_until(
        &format!("instance {instance_id} to reach {accept:?}"),
        config.convergence_timeout,
        config.convergence_poll,
        || async move {
            let instance = fim.instance_info(instance_id).await?;
            if accept.contains(&instance.status) {
                Ok(Some(instance))
            } else if instance.status == FduState::Error {
                Err(OrchestratorError::InstanceFailed(instance_id.to_string()))
            } else {
                Ok(None)
            }
        },
    )
    .await
}
