//! Opening backend clients.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cloud::{CloudClient, CloudCredentials};
use crate::error::BackendResult;
use crate::fim::FimClient;

/// Connects to backends on behalf of the registry.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Open a FIM client from its locator (e.g. `tcp/10.0.0.1:7447`).
    async fn open_fim(&self, locator: &str) -> BackendResult<Arc<dyn FimClient>>;

    /// Open a Kubernetes client.
    async fn open_cloud(&self, credentials: &CloudCredentials)
    -> BackendResult<Arc<dyn CloudClient>>;
}
