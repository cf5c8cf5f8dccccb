//! Orchestrator error types.

use force_backend::BackendError;
use force_state::StateError;
use thiserror::Error;

/// Errors raised by the system/tenant/backend registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("system {0} already exists")]
    SystemExists(String),

    #[error("system {0} does not exist")]
    SystemNotFound(String),

    #[error("tenant {0} already exists")]
    TenantExists(String),

    #[error("tenant {0} does not exist")]
    TenantNotFound(String),

    #[error("FIM {0} already exists")]
    FimExists(String),

    #[error("FIM {0} does not exist")]
    FimNotFound(String),

    #[error("cloud {0} already exists")]
    CloudExists(String),

    #[error("cloud {0} does not exist")]
    CloudNotFound(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while accepting or executing jobs.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("undecodable job: {0}")]
    Decode(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("entity instance not found: {0}")]
    InstanceNotFound(String),

    #[error("no FDU descriptor owns instance {0}")]
    FduNotFound(String),

    #[error("no FIM given for {0}")]
    MissingFim(String),

    #[error("no cloud given for {0}")]
    MissingCloud(String),

    #[error("connection point {cp} refers to unknown virtual link {vld_ref}")]
    BrokenReference { cp: String, vld_ref: String },

    #[error("no compatible node for FDU {0}")]
    NoCompatibleNode(String),

    #[error("dependency cycle between FDUs: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("instance {0} went into error")]
    InstanceFailed(String),

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout {
        what: String,
        after: std::time::Duration,
    },
}

impl OrchestratorError {
    /// The failing job's descriptor can never succeed as written; its
    /// record goes to `INVALID` instead of `ERROR`.
    pub fn marks_invalid(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidDescriptor(_) | OrchestratorError::DependencyCycle(_)
        )
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
