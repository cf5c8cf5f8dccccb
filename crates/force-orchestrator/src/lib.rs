//! force-orchestrator — the FOrcE control loop.
//!
//! Accepts job requests per system and tenant, runs lifecycle workers
//! (onboard, offload, instantiate, teardown) against FIM and Kubernetes
//! backends, and keeps every live instance under periodic monitoring with
//! automatic recovery of lost FDU replicas.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── Registry (system → tenant → store, FIM clients, cloud clients)
//!   ├── JobQueue (bounded) ──► dispatch loop ──► one task per job
//!   │     └── workers: test, onboard, offload, instantiate, teardown, monitoring
//!   └── MonitorSpawner (one task per live instance)
//!         └── submits `monitoring` jobs; the monitor may spawn a recovery
//! ```

pub mod converge;
pub mod convert;
pub mod error;
pub mod orchestrator;
pub mod ordering;
pub mod queue;
pub mod registry;
pub mod selector;
pub mod spawner;
mod workers;

pub use error::{OrchestratorError, OrchestratorResult, RegistryError, RegistryResult};
pub use orchestrator::{MONITORING_SENDER, Orchestrator};
pub use queue::{EnqueuedJob, JobQueue};
pub use registry::{Registry, Systems, TenantHandles};
pub use spawner::{MonitorSpawner, Tick, TickFn, TickFuture};
