//! Deployment order of the FDUs of one entity.

use std::collections::HashSet;

use force_core::FduDescriptor;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Order FDUs so every FDU comes after the FDUs it depends on.
///
/// Works in passes: each pass places every FDU whose dependencies are
/// already placed, keeping declaration order within a pass. A pass that
/// places nothing means a cycle (or a dependency on an FDU that is not
/// part of the entity).
pub fn deployment_order(fdus: &[FduDescriptor]) -> OrchestratorResult<Vec<FduDescriptor>> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(fdus.len());
    let mut pending: Vec<&FduDescriptor> = fdus.iter().collect();

    while !pending.is_empty() {
        let (ready, blocked): (Vec<&FduDescriptor>, Vec<&FduDescriptor>) = pending
            .into_iter()
            .partition(|fdu| fdu.depends_on.iter().all(|dep| placed.contains(dep.as_str())));
        if ready.is_empty() {
            return Err(OrchestratorError::DependencyCycle(
                blocked.iter().map(|fdu| fdu.id.clone()).collect(),
            ));
        }
        for fdu in ready {
            placed.insert(fdu.id.as_str());
            ordered.push(fdu.clone());
        }
        pending = blocked;
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use force_core::Hypervisor;

    fn fdu(id: &str, deps: &[&str]) -> FduDescriptor {
        FduDescriptor {
            id: id.to_string(),
            uuid: None,
            name: id.to_string(),
            description: None,
            image: None,
            hypervisor: Hypervisor::Lxd,
            hypervisor_specific: None,
            computation_requirements: Default::default(),
            interfaces: vec![],
            connection_points: vec![],
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            replicas: None,
        }
    }

    fn ids(fdus: &[FduDescriptor]) -> Vec<&str> {
        fdus.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let fdus = vec![fdu("web", &["db"]), fdu("db", &[]), fdu("cache", &[])];
        let ordered = deployment_order(&fdus).unwrap();
        assert_eq!(ids(&ordered), vec!["db", "cache", "web"]);
    }

    #[test]
    fn chains_resolve_over_several_passes() {
        let fdus = vec![fdu("c", &["b"]), fdu("b", &["a"]), fdu("a", &[])];
        let ordered = deployment_order(&fdus).unwrap();
        assert_eq!(ids(&ordered), vec!["a", "b", "c"]);
    }

    #[test]
    fn cycles_are_reported() {
        let fdus = vec![fdu("a", &["b"]), fdu("b", &["a"]), fdu("c", &[])];
        match deployment_order(&fdus) {
            Err(OrchestratorError::DependencyCycle(ids)) => assert_eq!(ids, vec!["a", "b"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_never_resolves() {
        let fdus = vec![fdu("a", &["missing"])];
        assert!(matches!(
            deployment_order(&fdus),
            Err(OrchestratorError::DependencyCycle(_))
        ));
    }

    #[test]
    fn empty_entity() {
        assert!(deployment_order(&[]).unwrap().is_empty());
    }
}
