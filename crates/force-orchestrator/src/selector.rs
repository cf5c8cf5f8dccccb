//! Node selection for new FDU instances.
//!
//! Placement is a uniform random pick among the nodes the FIM reports as
//! compatible. First-fit and least-used placement are possible
//! alternatives; neither is implemented.

use force_backend::FimClient;
use force_core::NodeId;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};

pub async fn select_node(fim: &dyn FimClient, fdu_id: &str) -> OrchestratorResult<NodeId> {
    let nodes = fim.compatible_nodes(fdu_id).await?;
    let node = pick(&nodes).ok_or_else(|| OrchestratorError::NoCompatibleNode(fdu_id.to_string()))?;
    debug!(%fdu_id, %node, candidates = nodes.len(), "node selected");
    Ok(node)
}

fn pick(nodes: &[NodeId]) -> Option<NodeId> {
    nodes.choose(&mut rand::rng()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use force_backend::{FimComputationRequirements, FimFdu, SimulatedFim};

    fn fdu(uuid: &str) -> FimFdu {
        FimFdu {
            id: uuid.to_string(),
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            description: None,
            image: None,
            hypervisor: "LXD".to_string(),
            computation_requirements: FimComputationRequirements::default(),
            migration_kind: "COLD".to_string(),
            depends_on: vec![],
            interfaces: vec![],
            connection_points: vec![],
        }
    }

    #[test]
    fn pick_from_empty_list() {
        assert_eq!(pick(&[]), None);
    }

    #[test]
    fn pick_stays_within_candidates() {
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        for _ in 0..32 {
            let node = pick(&nodes).unwrap();
            assert!(nodes.contains(&node));
        }
    }

    #[tokio::test]
    async fn selects_a_compatible_node() {
        let fim = SimulatedFim::new("tcp/fim", &["n1", "n2"]);
        fim.fdu_onboard(fdu("f1")).await.unwrap();
        let node = select_node(&fim, "f1").await.unwrap();
        assert!(node == "n1" || node == "n2");
    }

    #[tokio::test]
    async fn no_nodes_is_an_error() {
        let fim = SimulatedFim::new("tcp/fim", &[]);
        fim.fdu_onboard(fdu("f1")).await.unwrap();
        assert!(matches!(
            select_node(&fim, "f1").await,
            Err(OrchestratorError::NoCompatibleNode(_))
        ));
    }
}
