//! force-backend — execution backends FOrcE deploys onto.
//!
//! Two kinds of backend exist: a FIM (fog infrastructure manager) that
//! owns nodes, networks and FDU lifecycles, and a Kubernetes cluster
//! ("cloud") that runs Deployments. Both are reached through async
//! traits; a [`BackendFactory`] opens clients from locators and
//! credentials. The `simulated` module provides in-process backends.

pub mod cloud;
pub mod error;
pub mod factory;
pub mod fim;
pub mod simulated;

pub use cloud::{CloudClient, CloudCredentials, Deployment, DeploymentState, DeploymentStatus};
pub use error::{BackendError, BackendResult};
pub use factory::BackendFactory;
pub use fim::{
    AddressInformation, FimClient, FimComputationRequirements, FimConnectionPoint, FimFdu,
    FimInstance, FimInterface, FimNode, FimVirtualInterface, VirtualNetwork,
};
pub use simulated::{SimulatedBackends, SimulatedCloud, SimulatedFim};
