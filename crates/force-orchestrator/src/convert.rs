//! Translation of catalog descriptors into FIM descriptors.

use force_backend::{
    AddressInformation, BackendError, FimClient, FimComputationRequirements, FimConnectionPoint,
    FimFdu, FimInterface, FimVirtualInterface, VirtualNetwork,
};
use force_core::{EntityDescriptor, FduDescriptor, VirtualLinkDescriptor, new_id};

use crate::error::{OrchestratorError, OrchestratorResult};

const DEFAULT_BANDWIDTH: u32 = 100;

/// Build the FIM network realizing a virtual link. The network is named
/// after the link UUID so it can be found again by name.
pub fn to_virtual_network(vl: &VirtualLinkDescriptor) -> OrchestratorResult<VirtualNetwork> {
    let ip = &vl.ip_configuration;
    let subnet = ip.subnet.clone().ok_or_else(|| {
        OrchestratorError::InvalidDescriptor(format!("virtual link {} has no subnet", vl.id))
    })?;
    Ok(VirtualNetwork {
        uuid: new_id(),
        name: vl.key().to_string(),
        net_type: "ELAN".to_string(),
        ip_configuration: Some(AddressInformation {
            ip_version: vl.ip_version,
            subnet,
            gateway: ip.gateway.clone(),
            dhcp_enable: true,
            dhcp_range: ip.dhcp_range.clone(),
            dns: ip.dns.clone(),
        }),
    })
}

/// Ids of every FIM network named `name`.
pub async fn networks_named(fim: &dyn FimClient, name: &str) -> OrchestratorResult<Vec<String>> {
    let mut found = Vec::new();
    for net_id in fim.network_list().await? {
        match fim.network_get(&net_id).await {
            Ok(net) if net.name == name => found.push(net.uuid),
            Ok(_) => {}
            // Removed between list and get.
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(found)
}

/// Translate an FDU into the FIM descriptor shape. Connection points are
/// resolved to the FIM networks created for their virtual links, and only
/// networks listed in `instance_networks` are accepted: another instance of
/// the same entity owns networks with the same name.
pub async fn to_fim_fdu(
    fdu: &FduDescriptor,
    entity: &EntityDescriptor,
    fim: &dyn FimClient,
    instance_networks: &[String],
) -> OrchestratorResult<FimFdu> {
    let interfaces = fdu
        .interfaces
        .iter()
        .map(|intf| FimInterface {
            name: intf.name.clone(),
            is_mgmt: false,
            if_type: "INTERNAL".to_string(),
            mac_address: intf.mac_address.clone(),
            cp_id: intf.cp_id.clone(),
            virtual_interface: FimVirtualInterface {
                intf_type: intf.virtual_interface.intf_type.clone(),
                vpci: intf.virtual_interface.parent.clone().unwrap_or_default(),
                bandwidth: intf.virtual_interface.bandwidth.unwrap_or(DEFAULT_BANDWIDTH),
            },
        })
        .collect();

    let mut connection_points = Vec::with_capacity(fdu.connection_points.len());
    for cp in &fdu.connection_points {
        let broken = || OrchestratorError::BrokenReference {
            cp: cp.id.clone(),
            vld_ref: cp.vld_ref.clone(),
        };
        let vl = entity.virtual_link(&cp.vld_ref).ok_or_else(broken)?;
        let net_id = networks_named(fim, vl.key())
            .await?
            .into_iter()
            .find(|id| instance_networks.contains(id))
            .ok_or_else(|| {
                OrchestratorError::Backend(BackendError::NotFound(format!(
                    "network for virtual link {}",
                    vl.key()
                )))
            })?;
        connection_points.push(FimConnectionPoint {
            id: cp.id.clone(),
            uuid: cp.uuid.clone(),
            name: cp.name.clone(),
            vld_ref: net_id,
        });
    }

    let req = &fdu.computation_requirements;
    Ok(FimFdu {
        id: fdu.id.clone(),
        uuid: fdu.key().to_string(),
        name: fdu.name.clone(),
        description: fdu.description.clone(),
        image: fdu.image.clone(),
        hypervisor: fdu.hypervisor.as_str().to_string(),
        computation_requirements: FimComputationRequirements {
            cpu_arch: req.cpu_arch.clone(),
            cpu_min_freq: req.cpu_min_freq,
            cpu_min_count: req.cpu_min_count,
            ram_size_mb: f64::from(req.ram_size_mb),
            storage_size_gb: f64::from(req.storage_size_mb) / 1024.0,
        },
        migration_kind: "COLD".to_string(),
        depends_on: fdu.depends_on.clone(),
        interfaces,
        connection_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use force_backend::SimulatedFim;
    use force_core::{
        ComputationRequirements, ConnectionPointDescriptor, Hypervisor, InterfaceDescriptor,
        IpConfiguration, IpVersion, VirtualInterface,
    };

    fn link(id: &str, uuid: &str) -> VirtualLinkDescriptor {
        VirtualLinkDescriptor {
            id: id.to_string(),
            uuid: Some(uuid.to_string()),
            name: None,
            ip_version: IpVersion::V4,
            ip_configuration: IpConfiguration {
                subnet: Some("10.0.0.0/24".to_string()),
                gateway: Some("10.0.0.1".to_string()),
                dhcp_range: None,
                dns: None,
            },
        }
    }

    fn entity(vld_ref: &str) -> EntityDescriptor {
        EntityDescriptor {
            id: "app".to_string(),
            uuid: Some("e1".to_string()),
            name: "app".to_string(),
            description: None,
            version: None,
            fdus: vec![FduDescriptor {
                id: "web".to_string(),
                uuid: Some("f1".to_string()),
                name: "web".to_string(),
                description: None,
                image: None,
                hypervisor: Hypervisor::Lxd,
                hypervisor_specific: None,
                computation_requirements: ComputationRequirements {
                    cpu_arch: "x86_64".to_string(),
                    cpu_min_freq: 0,
                    cpu_min_count: 1,
                    ram_size_mb: 512,
                    storage_size_mb: 2048,
                },
                interfaces: vec![InterfaceDescriptor {
                    name: "eth0".to_string(),
                    kind: "INTERNAL".to_string(),
                    mac_address: None,
                    virtual_interface: VirtualInterface {
                        intf_type: "VIRTIO".to_string(),
                        parent: None,
                        bandwidth: None,
                    },
                    cp_id: Some("cp0".to_string()),
                }],
                connection_points: vec![ConnectionPointDescriptor {
                    id: "cp0".to_string(),
                    uuid: None,
                    name: "cp0".to_string(),
                    vld_ref: vld_ref.to_string(),
                }],
                depends_on: vec![],
                replicas: None,
            }],
            virtual_links: vec![link("net", "vl-uuid")],
        }
    }

    #[test]
    fn virtual_network_named_after_link() {
        let net = to_virtual_network(&link("net", "vl-uuid")).unwrap();
        assert_eq!(net.name, "vl-uuid");
        assert_eq!(net.net_type, "ELAN");
        let ip = net.ip_configuration.unwrap();
        assert!(ip.dhcp_enable);
        assert_eq!(ip.subnet, "10.0.0.0/24");
    }

    #[test]
    fn link_without_subnet_is_invalid() {
        let mut vl = link("net", "vl-uuid");
        vl.ip_configuration.subnet = None;
        assert!(matches!(
            to_virtual_network(&vl),
            Err(OrchestratorError::InvalidDescriptor(_))
        ));
    }

    #[tokio::test]
    async fn connection_points_resolve_to_fim_networks() {
        let fim = SimulatedFim::new("tcp/fim", &["n1"]);
        let net = to_virtual_network(&link("net", "vl-uuid")).unwrap();
        let net_id = net.uuid.clone();
        fim.network_add(net).await.unwrap();

        let entity = entity("net");
        let fim_fdu = to_fim_fdu(&entity.fdus[0], &entity, &fim, &[net_id.clone()])
            .await
            .unwrap();
        assert_eq!(fim_fdu.uuid, "f1");
        assert_eq!(fim_fdu.hypervisor, "LXD");
        assert_eq!(fim_fdu.migration_kind, "COLD");
        assert_eq!(fim_fdu.computation_requirements.storage_size_gb, 2.0);
        assert_eq!(fim_fdu.interfaces[0].virtual_interface.bandwidth, 100);
        assert_eq!(fim_fdu.interfaces[0].if_type, "INTERNAL");
        assert_eq!(fim_fdu.connection_points[0].vld_ref, net_id);
    }

    #[tokio::test]
    async fn broken_link_reference() {
        let fim = SimulatedFim::new("tcp/fim", &["n1"]);
        let entity = entity("nowhere");
        assert!(matches!(
            to_fim_fdu(&entity.fdus[0], &entity, &fim, &[]).await,
            Err(OrchestratorError::BrokenReference { .. })
        ));
    }

    #[tokio::test]
    async fn missing_network_is_a_backend_error() {
        let fim = SimulatedFim::new("tcp/fim", &["n1"]);
        let entity = entity("net");
        assert!(matches!(
            to_fim_fdu(&entity.fdus[0], &entity, &fim, &[]).await,
            Err(OrchestratorError::Backend(BackendError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn only_networks_of_this_instance_are_used() {
        let fim = SimulatedFim::new("tcp/fim", &["n1"]);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let net = to_virtual_network(&link("net", "vl-uuid")).unwrap();
            ids.push(net.uuid.clone());
            fim.network_add(net).await.unwrap();
        }

        let entity = entity("net");
        for own in &ids {
            let fim_fdu = to_fim_fdu(&entity.fdus[0], &entity, &fim, std::slice::from_ref(own))
                .await
                .unwrap();
            assert_eq!(&fim_fdu.connection_points[0].vld_ref, own);
        }

        // Same-named networks of other instances do not count.
        assert!(matches!(
            to_fim_fdu(&entity.fdus[0], &entity, &fim, &["other".to_string()]).await,
            Err(OrchestratorError::Backend(BackendError::NotFound(_)))
        ));
    }
}
