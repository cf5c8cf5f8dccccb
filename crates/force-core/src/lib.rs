//! force-core — value objects shared by every FOrcE crate.
//!
//! Descriptors (what the tenant asked for), records (what is running),
//! jobs (asynchronous work requests), and the daemon configuration.

pub mod config;
pub mod descriptor;
pub mod job;
pub mod types;

pub use config::{
    CloudBinding, FimBinding, ForceConfig, LogConfig, OrchestratorConfig, StoreConfig,
    format_duration, parse_duration,
};
pub use descriptor::*;
pub use job::*;
pub use types::*;

/// Id of the system and tenant that always exist.
pub const DEFAULT_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Generate a fresh random identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
