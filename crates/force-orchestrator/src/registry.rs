//! Registry — the systems, tenants and backend clients this daemon serves.
//!
//! Systems own tenants; tenants own a store connector plus the FIM and
//! cloud clients bound to them. Every system is created with a default
//! tenant. All maps live behind one `RwLock`: the facade takes short
//! read or write sections, and lifecycle workers hold the write side for
//! their whole run through [`Registry::lock_exclusive`].

use std::collections::HashMap;
use std::sync::Arc;

use force_backend::{BackendFactory, CloudClient, CloudCredentials, FimClient};
use force_core::{CloudInfo, DEFAULT_UUID, FimInfo};
use force_state::{StateStore, TenantStore};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{info, warn};

use crate::error::{RegistryError, RegistryResult};

/// Handles of one tenant.
#[derive(Clone)]
pub struct TenantHandles {
    pub store: TenantStore,
    fims: HashMap<String, Arc<dyn FimClient>>,
    clouds: HashMap<String, Arc<dyn CloudClient>>,
}

impl TenantHandles {
    fn new(store: TenantStore) -> Self {
        Self {
            store,
            fims: HashMap::new(),
            clouds: HashMap::new(),
        }
    }

    pub fn fim(&self, fim_id: &str) -> RegistryResult<Arc<dyn FimClient>> {
        self.fims
            .get(fim_id)
            .cloned()
            .ok_or_else(|| RegistryError::FimNotFound(fim_id.to_string()))
    }

    pub fn cloud(&self, cloud_id: &str) -> RegistryResult<Arc<dyn CloudClient>> {
        self.clouds
            .get(cloud_id)
            .cloned()
            .ok_or_else(|| RegistryError::CloudNotFound(cloud_id.to_string()))
    }

    async fn close(&self) {
        self.store.close();
        for (fim_id, fim) in &self.fims {
            if let Err(e) = fim.close().await {
                warn!(%fim_id, error = %e, "failed to close FIM client");
            }
        }
    }
}

/// The system → tenant map guarded by the registry lock.
#[derive(Default)]
pub struct Systems {
    systems: HashMap<String, HashMap<String, TenantHandles>>,
}

impl Systems {
    pub fn tenant(&self, system_id: &str, tenant_id: &str) -> RegistryResult<&TenantHandles> {
        self.systems
            .get(system_id)
            .ok_or_else(|| RegistryError::SystemNotFound(system_id.to_string()))?
            .get(tenant_id)
            .ok_or_else(|| RegistryError::TenantNotFound(tenant_id.to_string()))
    }

    fn tenant_mut(
        &mut self,
        system_id: &str,
        tenant_id: &str,
    ) -> RegistryResult<&mut TenantHandles> {
        self.systems
            .get_mut(system_id)
            .ok_or_else(|| RegistryError::SystemNotFound(system_id.to_string()))?
            .get_mut(tenant_id)
            .ok_or_else(|| RegistryError::TenantNotFound(tenant_id.to_string()))
    }
}

pub struct Registry {
    systems: RwLock<Systems>,
    store: StateStore,
    backends: Arc<dyn BackendFactory>,
}

impl Registry {
    pub fn new(store: StateStore, backends: Arc<dyn BackendFactory>) -> Self {
        Self {
            systems: RwLock::new(Systems::default()),
            store,
            backends,
        }
    }

    /// Take the registry for the duration of a worker run.
    ///
    /// The holder must not call any other `Registry` method until the
    /// guard is dropped.
    pub async fn lock_exclusive(&self) -> RwLockWriteGuard<'_, Systems> {
        self.systems.write().await
    }

    // ── Systems ────────────────────────────────────────────────────

    /// Create a system together with its default tenant.
    pub async fn add_system(&self, system_id: &str) -> RegistryResult<()> {
        let mut systems = self.systems.write().await;
        if systems.systems.contains_key(system_id) {
            return Err(RegistryError::SystemExists(system_id.to_string()));
        }
        let mut tenants = HashMap::new();
        tenants.insert(
            DEFAULT_UUID.to_string(),
            TenantHandles::new(self.store.tenant(system_id, DEFAULT_UUID)),
        );
        systems.systems.insert(system_id.to_string(), tenants);
        info!(%system_id, "system added");
        Ok(())
    }

    pub async fn remove_system(&self, system_id: &str) -> RegistryResult<()> {
        let tenants = self
            .systems
            .write()
            .await
            .systems
            .remove(system_id)
            .ok_or_else(|| RegistryError::SystemNotFound(system_id.to_string()))?;
        for handles in tenants.values() {
            handles.close().await;
        }
        info!(%system_id, "system removed");
        Ok(())
    }

    pub async fn get_systems(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.systems.read().await.systems.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ── Tenants ────────────────────────────────────────────────────

    pub async fn add_tenant(&self, system_id: &str, tenant_id: &str) -> RegistryResult<()> {
        let mut systems = self.systems.write().await;
        let tenants = systems
            .systems
            .get_mut(system_id)
            .ok_or_else(|| RegistryError::SystemNotFound(system_id.to_string()))?;
        if tenants.contains_key(tenant_id) {
            return Err(RegistryError::TenantExists(tenant_id.to_string()));
        }
        tenants.insert(
            tenant_id.to_string(),
            TenantHandles::new(self.store.tenant(system_id, tenant_id)),
        );
        info!(%system_id, %tenant_id, "tenant added");
        Ok(())
    }

    pub async fn remove_tenant(&self, system_id: &str, tenant_id: &str) -> RegistryResult<()> {
        let handles = {
            let mut systems = self.systems.write().await;
            systems
                .systems
                .get_mut(system_id)
                .ok_or_else(|| RegistryError::SystemNotFound(system_id.to_string()))?
                .remove(tenant_id)
                .ok_or_else(|| RegistryError::TenantNotFound(tenant_id.to_string()))?
        };
        handles.close().await;
        info!(%system_id, %tenant_id, "tenant removed");
        Ok(())
    }

    pub async fn get_tenants(&self, system_id: &str) -> RegistryResult<Vec<String>> {
        let systems = self.systems.read().await;
        let mut ids: Vec<String> = systems
            .systems
            .get(system_id)
            .ok_or_else(|| RegistryError::SystemNotFound(system_id.to_string()))?
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn tenant_store(&self, system_id: &str, tenant_id: &str) -> RegistryResult<TenantStore> {
        let systems = self.systems.read().await;
        Ok(systems.tenant(system_id, tenant_id)?.store.clone())
    }

    pub async fn tenant_handles(
        &self,
        system_id: &str,
        tenant_id: &str,
    ) -> RegistryResult<TenantHandles> {
        let systems = self.systems.read().await;
        systems.tenant(system_id, tenant_id).cloned()
    }

    // ── FIMs ───────────────────────────────────────────────────────

    /// Connect to a FIM and bind it to a tenant.
    pub async fn add_fim(
        &self,
        system_id: &str,
        tenant_id: &str,
        fim_id: &str,
        locator: &str,
    ) -> RegistryResult<()> {
        let mut systems = self.systems.write().await;
        let handles = systems.tenant_mut(system_id, tenant_id)?;
        if handles.fims.contains_key(fim_id) {
            return Err(RegistryError::FimExists(fim_id.to_string()));
        }
        let client = self.backends.open_fim(locator).await?;
        let info = FimInfo {
            uuid: fim_id.to_string(),
            locator: locator.to_string(),
        };
        if let Err(e) = handles.store.put_fim_info(&info) {
            if let Err(close_err) = client.close().await {
                warn!(%fim_id, error = %close_err, "failed to close FIM client");
            }
            return Err(e.into());
        }
        handles.fims.insert(fim_id.to_string(), client);
        info!(%system_id, %tenant_id, %fim_id, %locator, "FIM added");
        Ok(())
    }

    pub async fn remove_fim(
        &self,
        system_id: &str,
        tenant_id: &str,
        fim_id: &str,
    ) -> RegistryResult<()> {
        let mut systems = self.systems.write().await;
        let handles = systems.tenant_mut(system_id, tenant_id)?;
        let client = handles
            .fims
            .remove(fim_id)
            .ok_or_else(|| RegistryError::FimNotFound(fim_id.to_string()))?;
        handles.store.remove_fim_info(fim_id)?;
        if let Err(e) = client.close().await {
            warn!(%fim_id, error = %e, "failed to close FIM client");
        }
        info!(%system_id, %tenant_id, %fim_id, "FIM removed");
        Ok(())
    }

    pub async fn get_fims(&self, system_id: &str, tenant_id: &str) -> RegistryResult<Vec<String>> {
        let systems = self.systems.read().await;
        let mut ids: Vec<String> = systems
            .tenant(system_id, tenant_id)?
            .fims
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn get_fim(
        &self,
        system_id: &str,
        tenant_id: &str,
        fim_id: &str,
    ) -> RegistryResult<FimInfo> {
        let store = self.tenant_store(system_id, tenant_id).await?;
        store
            .get_fim_info(fim_id)?
            .ok_or_else(|| RegistryError::FimNotFound(fim_id.to_string()))
    }

    // ── Clouds ─────────────────────────────────────────────────────

    /// Bind a Kubernetes cluster to a tenant from a kubeconfig (YAML or
    /// JSON) and its PEM material.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_cloud(
        &self,
        system_id: &str,
        tenant_id: &str,
        cloud_id: &str,
        config: &str,
        ca_data: &[u8],
        cert_data: &[u8],
        key_data: &[u8],
    ) -> RegistryResult<()> {
        let credentials = CloudCredentials::from_kubeconfig(config, ca_data, cert_data, key_data)?;
        self.add_cloud_credentials(system_id, tenant_id, cloud_id, credentials)
            .await
    }

    /// Bind a cluster from already parsed credentials.
    pub async fn add_cloud_credentials(
        &self,
        system_id: &str,
        tenant_id: &str,
        cloud_id: &str,
        credentials: CloudCredentials,
    ) -> RegistryResult<()> {
        let mut systems = self.systems.write().await;
        let handles = systems.tenant_mut(system_id, tenant_id)?;
        if handles.clouds.contains_key(cloud_id) {
            return Err(RegistryError::CloudExists(cloud_id.to_string()));
        }
        let info = CloudInfo {
            uuid: cloud_id.to_string(),
            config: credentials.to_json()?,
        };
        // Cloud clients hold no session; dropping one releases it.
        let client = self.backends.open_cloud(&credentials).await?;
        handles.store.put_cloud_info(&info)?;
        handles.clouds.insert(cloud_id.to_string(), client);
        info!(
            %system_id,
            %tenant_id,
            %cloud_id,
            server = credentials.server().unwrap_or("-"),
            "cloud added"
        );
        Ok(())
    }

    pub async fn remove_cloud(
        &self,
        system_id: &str,
        tenant_id: &str,
        cloud_id: &str,
    ) -> RegistryResult<()> {
        let mut systems = self.systems.write().await;
        let handles = systems.tenant_mut(system_id, tenant_id)?;
        handles
            .clouds
            .remove(cloud_id)
            .ok_or_else(|| RegistryError::CloudNotFound(cloud_id.to_string()))?;
        handles.store.remove_cloud_info(cloud_id)?;
        info!(%system_id, %tenant_id, %cloud_id, "cloud removed");
        Ok(())
    }

    pub async fn get_clouds(
        &self,
        system_id: &str,
        tenant_id: &str,
    ) -> RegistryResult<Vec<String>> {
        let systems = self.systems.read().await;
        let mut ids: Vec<String> = systems
            .tenant(system_id, tenant_id)?
            .clouds
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn get_cloud(
        &self,
        system_id: &str,
        tenant_id: &str,
        cloud_id: &str,
    ) -> RegistryResult<CloudInfo> {
        let store = self.tenant_store(system_id, tenant_id).await?;
        store
            .get_cloud_info(cloud_id)?
            .ok_or_else(|| RegistryError::CloudNotFound(cloud_id.to_string()))
    }
}
