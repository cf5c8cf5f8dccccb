//! Startup bindings — the systems, tenants, FIMs and clusters declared in
//! force.toml (`[[fims]]`, `[[clouds]]`) or with `--fim ID=LOCATOR`.
//!
//! Applying is idempotent: anything the store already restored is left as
//! it is, so the same config can be applied on every start.

use std::path::Path;

use anyhow::Context;
use force_core::{CloudBinding, FimBinding};
use force_orchestrator::{Orchestrator, RegistryError};
use tracing::{debug, info};

/// Create the system and the tenant unless they exist.
pub async fn ensure_tenant(
    orchestrator: &Orchestrator,
    system_id: &str,
    tenant_id: &str,
) -> anyhow::Result<()> {
    let registry = orchestrator.registry();
    match registry.add_system(system_id).await {
        Ok(()) | Err(RegistryError::SystemExists(_)) => {}
        Err(e) => return Err(e.into()),
    }
    match registry.add_tenant(system_id, tenant_id).await {
        Ok(()) | Err(RegistryError::TenantExists(_)) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Bind every declared FIM and cluster. Returns how many were new.
pub async fn apply(
    orchestrator: &Orchestrator,
    fims: &[FimBinding],
    clouds: &[CloudBinding],
) -> anyhow::Result<usize> {
    let registry = orchestrator.registry();
    let mut bound = 0;

    for fim in fims {
        ensure_tenant(orchestrator, &fim.system, &fim.tenant).await?;
        match registry
            .add_fim(&fim.system, &fim.tenant, &fim.id, &fim.locator)
            .await
        {
            Ok(()) => bound += 1,
            Err(RegistryError::FimExists(_)) => {
                debug!(fim_id = %fim.id, "FIM already bound");
            }
            Err(e) => return Err(e).with_context(|| format!("bind FIM {}", fim.id)),
        }
    }

    for cloud in clouds {
        ensure_tenant(orchestrator, &cloud.system, &cloud.tenant).await?;
        let kubeconfig = std::fs::read_to_string(&cloud.kubeconfig)
            .with_context(|| format!("read {}", cloud.kubeconfig.display()))?;
        let ca = read_optional(cloud.ca.as_deref())?;
        let cert = read_optional(cloud.cert.as_deref())?;
        let key = read_optional(cloud.key.as_deref())?;
        match registry
            .add_cloud(&cloud.system, &cloud.tenant, &cloud.id, &kubeconfig, &ca, &cert, &key)
            .await
        {
            Ok(()) => bound += 1,
            Err(RegistryError::CloudExists(_)) => {
                debug!(cloud_id = %cloud.id, "cloud already bound");
            }
            Err(e) => return Err(e).with_context(|| format!("bind cloud {}", cloud.id)),
        }
    }

    info!(
        declared = fims.len() + clouds.len(),
        bound, "startup bindings applied"
    );
    Ok(bound)
}

fn read_optional(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("read {}", path.display())),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;

    use force_backend::SimulatedBackends;
    use force_core::{DEFAULT_UUID, Job, JobPayload, JobStatus, OrchestratorConfig, new_id};
    use force_orchestrator::EnqueuedJob;
    use force_state::StateStore;
    use serde_json::json;

    async fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            OrchestratorConfig::default(),
            StateStore::open_in_memory().unwrap(),
            Arc::new(SimulatedBackends::default()),
        )
        .await
        .unwrap()
    }

    fn fim(id: &str, system: &str, tenant: &str) -> FimBinding {
        FimBinding {
            id: id.to_string(),
            locator: format!("tcp/{id}:7447"),
            system: system.to_string(),
            tenant: tenant.to_string(),
        }
    }

    async fn run_job(orchestrator: &Orchestrator, kind: &str, body: String) -> Job {
        let job = Job::queued(new_id(), "tests".to_string(), JobPayload::decode(kind, &body));
        let job_id = job.job_id.clone();
        orchestrator
            .registry()
            .tenant_store(DEFAULT_UUID, DEFAULT_UUID)
            .await
            .unwrap()
            .put_job(&job)
            .unwrap();
        orchestrator
            .execute(EnqueuedJob {
                job,
                system_id: DEFAULT_UUID.to_string(),
                tenant_id: DEFAULT_UUID.to_string(),
            })
            .await;
        orchestrator
            .get_job(DEFAULT_UUID, DEFAULT_UUID, &job_id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn declared_fim_serves_instantiate() {
        let orchestrator = orchestrator().await;
        let fims = [fim("fim-1", DEFAULT_UUID, DEFAULT_UUID)];
        assert_eq!(apply(&orchestrator, &fims, &[]).await.unwrap(), 1);
        assert_eq!(
            orchestrator
                .registry()
                .get_fims(DEFAULT_UUID, DEFAULT_UUID)
                .await
                .unwrap(),
            vec!["fim-1"]
        );

        let entity = json!({
            "id": "app",
            "name": "app",
            "fdus": [{"id": "web", "name": "web", "hypervisor": "LXD"}]
        });
        let onboard = run_job(&orchestrator, "onboard", entity.to_string()).await;
        assert_eq!(onboard.status, JobStatus::Completed, "{:?}", onboard.error);
        let JobPayload::Onboard(descriptor) = onboard.payload else {
            panic!("unexpected payload");
        };

        let body = json!({"uuid": descriptor.key(), "fim_id": "fim-1"}).to_string();
        let instantiate = run_job(&orchestrator, "instantiate", body).await;
        assert_eq!(instantiate.status, JobStatus::Completed, "{:?}", instantiate.error);
    }

    #[tokio::test]
    async fn bindings_create_their_tenant() {
        let orchestrator = orchestrator().await;
        let fims = [fim("fim-2", "edge", "acme")];
        apply(&orchestrator, &fims, &[]).await.unwrap();

        let registry = orchestrator.registry();
        assert!(registry.get_systems().await.contains(&"edge".to_string()));
        assert_eq!(registry.get_fims("edge", "acme").await.unwrap(), vec!["fim-2"]);
    }

    #[tokio::test]
    async fn applying_twice_binds_once() {
        let orchestrator = orchestrator().await;
        let fims = [fim("fim-1", DEFAULT_UUID, DEFAULT_UUID)];
        assert_eq!(apply(&orchestrator, &fims, &[]).await.unwrap(), 1);
        assert_eq!(apply(&orchestrator, &fims, &[]).await.unwrap(), 0);
        ensure_tenant(&orchestrator, DEFAULT_UUID, DEFAULT_UUID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cloud_binding_reads_kubeconfig() {
        let orchestrator = orchestrator().await;
        let mut kubeconfig = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            kubeconfig,
            "clusters:\n- name: lab\n  cluster:\n    server: https://k8s.local:6443"
        )
        .unwrap();
        let clouds = [CloudBinding {
            id: "k8s".to_string(),
            kubeconfig: kubeconfig.path().to_path_buf(),
            ca: None,
            cert: None,
            key: None,
            system: DEFAULT_UUID.to_string(),
            tenant: DEFAULT_UUID.to_string(),
        }];

        assert_eq!(apply(&orchestrator, &[], &clouds).await.unwrap(), 1);
        assert_eq!(
            orchestrator
                .registry()
                .get_clouds(DEFAULT_UUID, DEFAULT_UUID)
                .await
                .unwrap(),
            vec!["k8s"]
        );
    }

    #[tokio::test]
    async fn missing_kubeconfig_is_an_error() {
        let orchestrator = orchestrator().await;
        let clouds = [CloudBinding {
            id: "k8s".to_string(),
            kubeconfig: PathBuf::from("/nonexistent/kubeconfig"),
            ca: None,
            cert: None,
            key: None,
            system: DEFAULT_UUID.to_string(),
            tenant: DEFAULT_UUID.to_string(),
        }];
        assert!(apply(&orchestrator, &[], &clouds).await.is_err());
    }
}
