//! FIM client interface and the descriptor shapes a FIM understands.

use std::collections::HashMap;

use async_trait::async_trait;
use force_core::{FduImage, FduState, IpVersion, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

// ── Wire shapes ───────────────────────────────────────────────────

/// An FDU as onboarded into a FIM catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimFdu {
    pub id: String,
    pub uuid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<FduImage>,
    pub hypervisor: String,
    pub computation_requirements: FimComputationRequirements,
    pub migration_kind: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<FimInterface>,
    #[serde(default)]
    pub connection_points: Vec<FimConnectionPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FimComputationRequirements {
    pub cpu_arch: String,
    pub cpu_min_freq: u32,
    pub cpu_min_count: u32,
    pub ram_size_mb: f64,
    pub storage_size_gb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimInterface {
    pub name: String,
    pub is_mgmt: bool,
    pub if_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cp_id: Option<String>,
    pub virtual_interface: FimVirtualInterface,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimVirtualInterface {
    pub intf_type: String,
    pub vpci: String,
    pub bandwidth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimConnectionPoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    /// Backend id of the FIM network this point attaches to.
    pub vld_ref: String,
}

/// One FDU instance on a FIM node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimInstance {
    pub uuid: String,
    pub fdu_id: String,
    pub node_id: NodeId,
    pub status: FduState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimNode {
    pub uuid: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualNetwork {
    pub uuid: String,
    /// FOrcE names a network after the virtual link UUID it realizes.
    pub name: String,
    pub net_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_configuration: Option<AddressInformation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressInformation {
    pub ip_version: IpVersion,
    pub subnet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub dhcp_enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

// ── Client ────────────────────────────────────────────────────────

/// Operations FOrcE performs against a fog infrastructure manager.
#[async_trait]
pub trait FimClient: Send + Sync {
    async fn node_list(&self) -> BackendResult<Vec<NodeId>>;
    async fn node_info(&self, node_id: &str) -> BackendResult<FimNode>;

    async fn network_add(&self, network: VirtualNetwork) -> BackendResult<()>;
    async fn network_remove(&self, net_id: &str) -> BackendResult<()>;
    async fn network_remove_from_node(&self, node_id: &str, net_id: &str) -> BackendResult<()>;
    async fn network_list(&self) -> BackendResult<Vec<String>>;
    async fn network_get(&self, net_id: &str) -> BackendResult<VirtualNetwork>;

    async fn fdu_onboard(&self, fdu: FimFdu) -> BackendResult<()>;
    async fn fdu_offload(&self, fdu_id: &str) -> BackendResult<()>;
    async fn fdu_info(&self, fdu_id: &str) -> BackendResult<FimFdu>;

    /// Create an instance of an onboarded FDU on a node.
    async fn fdu_define(&self, node_id: &str, fdu_id: &str) -> BackendResult<FimInstance>;
    async fn fdu_configure(&self, instance_id: &str) -> BackendResult<()>;
    async fn fdu_start(&self, instance_id: &str) -> BackendResult<()>;
    async fn fdu_stop(&self, instance_id: &str) -> BackendResult<()>;
    async fn fdu_clean(&self, instance_id: &str) -> BackendResult<()>;
    async fn fdu_undefine(&self, instance_id: &str) -> BackendResult<()>;

    async fn instance_info(&self, instance_id: &str) -> BackendResult<FimInstance>;
    /// Instance ids of an FDU, grouped by node.
    async fn instance_list(&self, fdu_id: &str) -> BackendResult<HashMap<NodeId, Vec<String>>>;
    /// Nodes able to host an onboarded FDU.
    async fn compatible_nodes(&self, fdu_id: &str) -> BackendResult<Vec<NodeId>>;

    async fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}
