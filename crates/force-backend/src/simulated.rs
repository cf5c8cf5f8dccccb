//! In-process backends.
//!
//! `SimulatedFim` keeps nodes, networks, the FDU catalog and instances in
//! memory and enforces the FIM instance state machine:
//!
//! ```text
//! define ──► DEFINE ──configure──► CONFIGURE ──start──► RUN
//!   ▲            │ ▲                    │ ▲                │
//!   │        undefine └────clean─────────┘ └──────stop──────┘
//! ```
//!
//! Failures can be injected per operation name and instance states can be
//! overridden, which is how reconciliation is exercised without real
//! infrastructure. `SimulatedCloud` does the same for Deployments.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use force_core::{FduState, NodeId, new_id};
use tracing::debug;

use crate::cloud::{CloudClient, CloudCredentials, Deployment, DeploymentState, DeploymentStatus};
use crate::error::{BackendError, BackendResult};
use crate::factory::BackendFactory;
use crate::fim::{FimClient, FimFdu, FimInstance, FimNode, VirtualNetwork};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── FIM ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FimState {
    nodes: Vec<NodeId>,
    networks: BTreeMap<String, VirtualNetwork>,
    /// Networks attached to each node.
    attachments: HashMap<NodeId, BTreeSet<String>>,
    fdus: HashMap<String, FimFdu>,
    instances: BTreeMap<String, FimInstance>,
    failing: HashSet<String>,
    calls: Vec<String>,
    closed: bool,
}

pub struct SimulatedFim {
    locator: String,
    state: Mutex<FimState>,
}

impl SimulatedFim {
    pub fn new(locator: &str, nodes: &[&str]) -> Self {
        let state = FimState {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..FimState::default()
        };
        Self {
            locator: locator.to_string(),
            state: Mutex::new(state),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Make every later call of `op` (e.g. `"fdu_start"`) fail.
    pub fn fail_on(&self, op: &str) {
        lock(&self.state).failing.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failing.clear();
    }

    /// Force an instance into a state, as if it had crashed or paused.
    pub fn set_instance_status(&self, instance_id: &str, status: FduState) -> bool {
        match lock(&self.state).instances.get_mut(instance_id) {
            Some(instance) => {
                instance.status = status;
                true
            }
            None => false,
        }
    }

    /// Drop an instance, as if its node had vanished.
    pub fn remove_instance(&self, instance_id: &str) -> bool {
        lock(&self.state).instances.remove(instance_id).is_some()
    }

    pub fn instances(&self) -> Vec<FimInstance> {
        lock(&self.state).instances.values().cloned().collect()
    }

    pub fn networks(&self) -> Vec<VirtualNetwork> {
        lock(&self.state).networks.values().cloned().collect()
    }

    pub fn onboarded(&self) -> Vec<String> {
        lock(&self.state).fdus.keys().cloned().collect()
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn reopen(&self) {
        lock(&self.state).closed = false;
    }

    /// Record the call, then apply injected failures.
    fn enter(&self, op: &str) -> BackendResult<MutexGuard<'_, FimState>> {
        let mut state = lock(&self.state);
        state.calls.push(op.to_string());
        if state.closed {
            return Err(BackendError::Unavailable(format!("{} is closed", self.locator)));
        }
        if state.failing.contains(op) {
            return Err(BackendError::Unavailable(format!("injected failure in {op}")));
        }
        Ok(state)
    }

    /// Move an instance from one of `from` to `to`.
    fn transition(
        &self,
        op: &str,
        instance_id: &str,
        from: &[FduState],
        to: FduState,
    ) -> BackendResult<()> {
        let mut state = self.enter(op)?;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| BackendError::NotFound(format!("instance {instance_id}")))?;
        if !from.contains(&instance.status) {
            return Err(BackendError::Rejected(format!(
                "{op} on instance {instance_id} in state {:?}",
                instance.status
            )));
        }
        instance.status = to;
        debug!(fim = %self.locator, %instance_id, ?to, "instance transition");
        Ok(())
    }
}

#[async_trait]
impl FimClient for SimulatedFim {
    async fn node_list(&self) -> BackendResult<Vec<NodeId>> {
        Ok(self.enter("node_list")?.nodes.clone())
    }

    async fn node_info(&self, node_id: &str) -> BackendResult<FimNode> {
        let state = self.enter("node_info")?;
        if !state.nodes.iter().any(|n| n == node_id) {
            return Err(BackendError::NotFound(format!("node {node_id}")));
        }
        Ok(FimNode {
            uuid: node_id.to_string(),
            name: node_id.to_string(),
        })
    }

    async fn network_add(&self, network: VirtualNetwork) -> BackendResult<()> {
        let mut state = self.enter("network_add")?;
        if state.networks.contains_key(&network.uuid) {
            return Err(BackendError::Rejected(format!("network {} exists", network.uuid)));
        }
        let nodes = state.nodes.clone();
        for node in nodes {
            state
                .attachments
                .entry(node)
                .or_default()
                .insert(network.uuid.clone());
        }
        state.networks.insert(network.uuid.clone(), network);
        Ok(())
    }

    async fn network_remove(&self, net_id: &str) -> BackendResult<()> {
        let mut state = self.enter("network_remove")?;
        state
            .networks
            .remove(net_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("network {net_id}")))
    }

    async fn network_remove_from_node(&self, node_id: &str, net_id: &str) -> BackendResult<()> {
        let mut state = self.enter("network_remove_from_node")?;
        if let Some(attached) = state.attachments.get_mut(node_id) {
            attached.remove(net_id);
        }
        Ok(())
    }

    async fn network_list(&self) -> BackendResult<Vec<String>> {
        Ok(self.enter("network_list")?.networks.keys().cloned().collect())
    }

    async fn network_get(&self, net_id: &str) -> BackendResult<VirtualNetwork> {
        self.enter("network_get")?
            .networks
            .get(net_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("network {net_id}")))
    }

    async fn fdu_onboard(&self, fdu: FimFdu) -> BackendResult<()> {
        let mut state = self.enter("fdu_onboard")?;
        state.fdus.insert(fdu.uuid.clone(), fdu);
        Ok(())
    }

    async fn fdu_offload(&self, fdu_id: &str) -> BackendResult<()> {
        let mut state = self.enter("fdu_offload")?;
        if state.instances.values().any(|i| i.fdu_id == fdu_id) {
            return Err(BackendError::Rejected(format!("fdu {fdu_id} has instances")));
        }
        state
            .fdus
            .remove(fdu_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("fdu {fdu_id}")))
    }

    async fn fdu_info(&self, fdu_id: &str) -> BackendResult<FimFdu> {
        self.enter("fdu_info")?
            .fdus
            .get(fdu_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("fdu {fdu_id}")))
    }

    async fn fdu_define(&self, node_id: &str, fdu_id: &str) -> BackendResult<FimInstance> {
        let mut state = self.enter("fdu_define")?;
        if !state.fdus.contains_key(fdu_id) {
            return Err(BackendError::NotFound(format!("fdu {fdu_id}")));
        }
        if !state.nodes.iter().any(|n| n == node_id) {
            return Err(BackendError::NotFound(format!("node {node_id}")));
        }
        let instance = FimInstance {
            uuid: new_id(),
            fdu_id: fdu_id.to_string(),
            node_id: node_id.to_string(),
            status: FduState::Define,
        };
        state.instances.insert(instance.uuid.clone(), instance.clone());
        debug!(fim = %self.locator, instance_id = %instance.uuid, %node_id, "instance defined");
        Ok(instance)
    }

    async fn fdu_configure(&self, instance_id: &str) -> BackendResult<()> {
        self.transition("fdu_configure", instance_id, &[FduState::Define], FduState::Configure)
    }

    async fn fdu_start(&self, instance_id: &str) -> BackendResult<()> {
        self.transition("fdu_start", instance_id, &[FduState::Configure], FduState::Run)
    }

    async fn fdu_stop(&self, instance_id: &str) -> BackendResult<()> {
        self.transition(
            "fdu_stop",
            instance_id,
            &[FduState::Run, FduState::Starting, FduState::Pause],
            FduState::Configure,
        )
    }

    async fn fdu_clean(&self, instance_id: &str) -> BackendResult<()> {
        self.transition("fdu_clean", instance_id, &[FduState::Configure], FduState::Define)
    }

    async fn fdu_undefine(&self, instance_id: &str) -> BackendResult<()> {
        let mut state = self.enter("fdu_undefine")?;
        let status = state
            .instances
            .get(instance_id)
            .map(|i| i.status)
            .ok_or_else(|| BackendError::NotFound(format!("instance {instance_id}")))?;
        if status == FduState::Run {
            return Err(BackendError::Rejected(format!(
                "undefine on running instance {instance_id}"
            )));
        }
        state.instances.remove(instance_id);
        Ok(())
    }

    async fn instance_info(&self, instance_id: &str) -> BackendResult<FimInstance> {
        self.enter("instance_info")?
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("instance {instance_id}")))
    }

    async fn instance_list(&self, fdu_id: &str) -> BackendResult<HashMap<NodeId, Vec<String>>> {
        let state = self.enter("instance_list")?;
        let mut by_node: HashMap<NodeId, Vec<String>> = HashMap::new();
        for instance in state.instances.values().filter(|i| i.fdu_id == fdu_id) {
            by_node
                .entry(instance.node_id.clone())
                .or_default()
                .push(instance.uuid.clone());
        }
        Ok(by_node)
    }

    async fn compatible_nodes(&self, fdu_id: &str) -> BackendResult<Vec<NodeId>> {
        let state = self.enter("compatible_nodes")?;
        if !state.fdus.contains_key(fdu_id) {
            return Err(BackendError::NotFound(format!("fdu {fdu_id}")));
        }
        Ok(state.nodes.clone())
    }

    async fn close(&self) -> BackendResult<()> {
        lock(&self.state).closed = true;
        debug!(fim = %self.locator, "fim client closed");
        Ok(())
    }
}

// ── Cloud ─────────────────────────────────────────────────────────

#[derive(Default)]
struct CloudState {
    deployments: BTreeMap<(String, String), DeploymentState>,
    failing: HashSet<String>,
}

#[derive(Default)]
pub struct SimulatedCloud {
    state: Mutex<CloudState>,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: &str) {
        lock(&self.state).failing.insert(op.to_string());
    }

    /// Override the available replica count of a Deployment.
    pub fn set_available(&self, namespace: &str, name: &str, available: i32) -> bool {
        let key = (namespace.to_string(), name.to_string());
        match lock(&self.state).deployments.get_mut(&key) {
            Some(state) => {
                state.status.available_replicas = available;
                true
            }
            None => false,
        }
    }

    /// `(namespace, name)` of every Deployment.
    pub fn deployments(&self) -> Vec<(String, String)> {
        lock(&self.state).deployments.keys().cloned().collect()
    }

    fn enter(&self, op: &str) -> BackendResult<MutexGuard<'_, CloudState>> {
        let state = lock(&self.state);
        if state.failing.contains(op) {
            return Err(BackendError::Unavailable(format!("injected failure in {op}")));
        }
        Ok(state)
    }
}

#[async_trait]
impl CloudClient for SimulatedCloud {
    async fn create_deployment(
        &self,
        namespace: &str,
        mut deployment: Deployment,
    ) -> BackendResult<Deployment> {
        let mut state = self.enter("create_deployment")?;
        let key = (namespace.to_string(), deployment.metadata.name.clone());
        if state.deployments.contains_key(&key) {
            return Err(BackendError::Rejected(format!(
                "deployment {}/{} exists",
                key.0, key.1
            )));
        }
        deployment.metadata.namespace = Some(namespace.to_string());
        let replicas = deployment.desired_replicas();
        state.deployments.insert(
            key,
            DeploymentState {
                deployment: deployment.clone(),
                status: DeploymentStatus {
                    replicas,
                    available_replicas: replicas,
                },
            },
        );
        Ok(deployment)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> BackendResult<DeploymentState> {
        let key = (namespace.to_string(), name.to_string());
        self.enter("get_deployment")?
            .deployments
            .get(&key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("deployment {namespace}/{name}")))
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> BackendResult<()> {
        let key = (namespace.to_string(), name.to_string());
        self.enter("delete_deployment")?
            .deployments
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("deployment {namespace}/{name}")))
    }
}

// ── Factory ───────────────────────────────────────────────────────

/// Hands out simulated clients. The same locator (or API server) always
/// yields the same backend, so tests can reach in through [`Self::fim`]
/// and [`Self::cloud`].
pub struct SimulatedBackends {
    default_nodes: Vec<String>,
    fims: Mutex<HashMap<String, Arc<SimulatedFim>>>,
    clouds: Mutex<HashMap<String, Arc<SimulatedCloud>>>,
    unreachable: Mutex<HashSet<String>>,
}

impl SimulatedBackends {
    /// Every FIM opened through this factory starts with `nodes`.
    pub fn new(nodes: &[&str]) -> Self {
        Self {
            default_nodes: nodes.iter().map(|n| n.to_string()).collect(),
            fims: Mutex::new(HashMap::new()),
            clouds: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    /// The FIM behind a locator, created on first use.
    pub fn fim(&self, locator: &str) -> Arc<SimulatedFim> {
        let nodes: Vec<&str> = self.default_nodes.iter().map(String::as_str).collect();
        lock(&self.fims)
            .entry(locator.to_string())
            .or_insert_with(|| Arc::new(SimulatedFim::new(locator, &nodes)))
            .clone()
    }

    /// The cluster behind an API server address, created on first use.
    pub fn cloud(&self, server: &str) -> Arc<SimulatedCloud> {
        lock(&self.clouds)
            .entry(server.to_string())
            .or_insert_with(|| Arc::new(SimulatedCloud::new()))
            .clone()
    }

    /// Refuse connections to a locator.
    pub fn set_unreachable(&self, locator: &str) {
        lock(&self.unreachable).insert(locator.to_string());
    }

    fn check_reachable(&self, locator: &str) -> BackendResult<()> {
        if lock(&self.unreachable).contains(locator) {
            return Err(BackendError::Unavailable(format!("cannot reach {locator}")));
        }
        Ok(())
    }
}

impl Default for SimulatedBackends {
    fn default() -> Self {
        Self::new(&["node-1", "node-2"])
    }
}

#[async_trait]
impl BackendFactory for SimulatedBackends {
    async fn open_fim(&self, locator: &str) -> BackendResult<Arc<dyn FimClient>> {
        self.check_reachable(locator)?;
        let fim = self.fim(locator);
        fim.reopen();
        debug!(%locator, "simulated fim opened");
        Ok(fim)
    }

    async fn open_cloud(
        &self,
        credentials: &CloudCredentials,
    ) -> BackendResult<Arc<dyn CloudClient>> {
        let server = credentials.server().unwrap_or("default");
        self.check_reachable(server)?;
        debug!(%server, "simulated cloud opened");
        Ok(self.cloud(server))
    }
}
