//! Catalog descriptors — the templates a tenant onboards.
//!
//! An `EntityDescriptor` bundles FDUs and the virtual links connecting
//! them. UUIDs are optional on input and assigned at onboarding.

use serde::{Deserialize, Serialize};

use crate::new_id;

// ── Entity ────────────────────────────────────────────────────────

/// A composite application made of FDUs and virtual links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub fdus: Vec<FduDescriptor>,
    #[serde(default)]
    pub virtual_links: Vec<VirtualLinkDescriptor>,
}

impl EntityDescriptor {
    /// Fill in a UUID for the entity and every contained FDU and virtual
    /// link that lacks one. Existing UUIDs are kept.
    pub fn assign_uuids(&mut self) {
        self.uuid.get_or_insert_with(new_id);
        for fdu in &mut self.fdus {
            fdu.uuid.get_or_insert_with(new_id);
        }
        for vl in &mut self.virtual_links {
            vl.uuid.get_or_insert_with(new_id);
        }
    }

    /// Catalog UUID, falling back to the descriptor id before onboarding.
    pub fn key(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.id)
    }

    /// Find the virtual link a connection point refers to.
    pub fn virtual_link(&self, vld_ref: &str) -> Option<&VirtualLinkDescriptor> {
        self.virtual_links.iter().find(|vl| vl.id == vld_ref)
    }
}

// ── FDU ───────────────────────────────────────────────────────────

/// Execution backend an FDU is declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hypervisor {
    #[serde(rename = "BARE")]
    Bare,
    #[serde(rename = "KVM")]
    Kvm,
    #[serde(rename = "KVM_UK")]
    KvmUk,
    #[serde(rename = "XEN")]
    Xen,
    #[serde(rename = "XEN_UK")]
    XenUk,
    #[serde(rename = "LXD")]
    Lxd,
    #[serde(rename = "DOCKER")]
    Docker,
    #[serde(rename = "MCU")]
    Mcu,
    /// Deployed as a Kubernetes Deployment instead of on a FIM.
    #[serde(rename = "cloud", alias = "CLOUD")]
    Cloud,
}

impl Hypervisor {
    pub fn is_cloud(self) -> bool {
        matches!(self, Hypervisor::Cloud)
    }

    /// Name used in FIM descriptors.
    pub fn as_str(self) -> &'static str {
        match self {
            Hypervisor::Bare => "BARE",
            Hypervisor::Kvm => "KVM",
            Hypervisor::KvmUk => "KVM_UK",
            Hypervisor::Xen => "XEN",
            Hypervisor::XenUk => "XEN_UK",
            Hypervisor::Lxd => "LXD",
            Hypervisor::Docker => "DOCKER",
            Hypervisor::Mcu => "MCU",
            Hypervisor::Cloud => "cloud",
        }
    }
}

/// A deployable compute unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FduDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<FduImage>,
    pub hypervisor: Hypervisor,
    /// Backend-specific blob; for `cloud` FDUs a base64 encoded
    /// Deployment manifest (YAML or JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypervisor_specific: Option<String>,
    #[serde(default)]
    pub computation_requirements: ComputationRequirements,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDescriptor>,
    #[serde(default)]
    pub connection_points: Vec<ConnectionPointDescriptor>,
    /// Ids of FDUs in the same entity that must be deployed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u8>,
}

impl FduDescriptor {
    /// Catalog UUID, falling back to the descriptor id before onboarding.
    pub fn key(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.id)
    }

    /// Desired number of running copies, never less than one.
    pub fn min_replicas(&self) -> usize {
        usize::from(self.replicas.unwrap_or(1).max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FduImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComputationRequirements {
    #[serde(default)]
    pub cpu_arch: String,
    #[serde(default)]
    pub cpu_min_freq: u32,
    #[serde(default)]
    pub cpu_min_count: u32,
    #[serde(default)]
    pub ram_size_mb: u32,
    #[serde(default)]
    pub storage_size_mb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub virtual_interface: VirtualInterface,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cp_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualInterface {
    pub intf_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Mbit/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionPointDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    /// Id of the virtual link (within the entity) this point attaches to.
    pub vld_ref: String,
}

// ── Virtual links ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "IPV4")]
    V4,
    #[serde(rename = "IPV6")]
    V6,
}

/// A virtual network connecting FDU connection points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualLinkDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ip_version: IpVersion,
    #[serde(default)]
    pub ip_configuration: IpConfiguration,
}

impl VirtualLinkDescriptor {
    /// Catalog UUID, falling back to the descriptor id before onboarding.
    pub fn key(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IpConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "id": "web-app",
        "name": "web",
        "fdus": [
            {"id": "db", "name": "db", "hypervisor": "LXD", "replicas": 2},
            {"id": "api", "name": "api", "hypervisor": "cloud", "depends_on": ["db"]}
        ],
        "virtual_links": [
            {"id": "net0", "ip_version": "IPV4", "ip_configuration": {"subnet": "10.0.0.0/24"}}
        ]
    }"#;

    #[test]
    fn parse_entity_descriptor() {
        let desc: EntityDescriptor = serde_json::from_str(DESCRIPTOR).unwrap();
        assert_eq!(desc.fdus.len(), 2);
        assert_eq!(desc.fdus[0].hypervisor, Hypervisor::Lxd);
        assert!(desc.fdus[1].hypervisor.is_cloud());
        assert_eq!(desc.fdus[1].depends_on, vec!["db".to_string()]);
        assert_eq!(desc.virtual_links[0].ip_version, IpVersion::V4);
        assert!(desc.uuid.is_none());
    }

    #[test]
    fn assign_uuids_fills_only_missing() {
        let mut desc: EntityDescriptor = serde_json::from_str(DESCRIPTOR).unwrap();
        desc.fdus[0].uuid = Some("keep-me".to_string());
        desc.assign_uuids();

        assert!(desc.uuid.is_some());
        assert_eq!(desc.fdus[0].uuid.as_deref(), Some("keep-me"));
        assert!(desc.fdus[1].uuid.is_some());
        assert!(desc.virtual_links[0].uuid.is_some());

        let entity_uuid = desc.uuid.clone();
        desc.assign_uuids();
        assert_eq!(desc.uuid, entity_uuid);
    }

    #[test]
    fn min_replicas_is_at_least_one() {
        let mut desc: EntityDescriptor = serde_json::from_str(DESCRIPTOR).unwrap();
        assert_eq!(desc.fdus[0].min_replicas(), 2);
        assert_eq!(desc.fdus[1].min_replicas(), 1);
        desc.fdus[0].replicas = Some(0);
        assert_eq!(desc.fdus[0].min_replicas(), 1);
    }

    #[test]
    fn virtual_link_lookup_by_id() {
        let desc: EntityDescriptor = serde_json::from_str(DESCRIPTOR).unwrap();
        assert!(desc.virtual_link("net0").is_some());
        assert!(desc.virtual_link("missing").is_none());
    }
}
