//! Runtime records for FOrcE.
//!
//! These types represent what is actually deployed: entity instances,
//! FDU instances, and the backend bindings of a tenant. All of them are
//! serializable to/from JSON for storage in the catalog.

use serde::{Deserialize, Serialize};

/// Unique identifier of an entity instance.
pub type InstanceId = String;

/// Unique identifier of a FIM node.
pub type NodeId = String;

// ── Entity instance ───────────────────────────────────────────────

/// Lifecycle status of an entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Onboarding,
    Starting,
    Running,
    Stopping,
    Offloading,
    Offloaded,
    Error,
    Recovering,
    Invalid,
}

impl EntityStatus {
    /// No writer may move a record out of this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, EntityStatus::Offloaded)
    }

    /// The monitor/recover loop leaves records in these states alone.
    pub fn is_reconcilable(self) -> bool {
        !matches!(
            self,
            EntityStatus::Stopping
                | EntityStatus::Offloading
                | EntityStatus::Offloaded
                | EntityStatus::Invalid
        )
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityStatus::Onboarding => "ONBOARDING",
            EntityStatus::Starting => "STARTING",
            EntityStatus::Running => "RUNNING",
            EntityStatus::Stopping => "STOPPING",
            EntityStatus::Offloading => "OFFLOADING",
            EntityStatus::Offloaded => "OFFLOADED",
            EntityStatus::Error => "ERROR",
            EntityStatus::Recovering => "RECOVERING",
            EntityStatus::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

/// A running instance of an entity descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    /// UUID of the entity descriptor this instance was created from.
    pub id: String,
    /// Instance UUID.
    pub uuid: InstanceId,
    pub status: EntityStatus,
    /// FDU instance ids (FIM instance UUIDs or Deployment names).
    pub fdus: Vec<String>,
    /// Backend ids of the virtual networks created for this instance.
    pub virtual_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fim_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
}

impl EntityRecord {
    /// Create a fresh record in `ONBOARDING`.
    pub fn new(
        entity_id: &str,
        instance_id: &str,
        fim_id: Option<String>,
        cloud_id: Option<String>,
    ) -> Self {
        Self {
            id: entity_id.to_string(),
            uuid: instance_id.to_string(),
            status: EntityStatus::Onboarding,
            fdus: Vec::new(),
            virtual_links: Vec::new(),
            fim_id,
            cloud_id,
        }
    }

    /// Build the composite key suffix for the entity records table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.id, self.uuid)
    }
}

// ── FDU instance ──────────────────────────────────────────────────

/// State of an FDU instance as reported by its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FduState {
    Define,
    Configure,
    Clean,
    Run,
    Starting,
    Stop,
    Resume,
    Pause,
    Scale,
    TakeOff,
    Land,
    Migrate,
    Undefine,
    Error,
}

/// Monitor classification of an FDU instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FduHealth {
    /// Running as desired.
    Healthy,
    /// On its way up; not ready, not broken.
    Transitional,
    /// Broken; must be replaced.
    Unhealthy,
    /// Anything else; not ready.
    Unknown,
}

impl FduState {
    pub fn health(self) -> FduHealth {
        match self {
            FduState::Run => FduHealth::Healthy,
            FduState::Starting | FduState::Configure | FduState::Define => {
                FduHealth::Transitional
            }
            FduState::Error | FduState::Pause => FduHealth::Unhealthy,
            _ => FduHealth::Unknown,
        }
    }
}

/// One running replica of an FDU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FduRecord {
    /// Instance id (FIM instance UUID or Deployment name).
    pub uuid: String,
    /// UUID of the FDU descriptor.
    pub fdu_id: String,
    pub status: FduState,
}

impl FduRecord {
    /// Build the composite key suffix for the FDU records table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.fdu_id, self.uuid)
    }
}

// ── Backend bindings ──────────────────────────────────────────────

/// Durable binding of a FIM to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FimInfo {
    pub uuid: String,
    pub locator: String,
}

/// Durable binding of a Kubernetes cluster to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudInfo {
    pub uuid: String,
    /// Serialized connection configuration, credentials included.
    pub config: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_status_wire_names() {
        let json = serde_json::to_string(&EntityStatus::Offloaded).unwrap();
        assert_eq!(json, "\"OFFLOADED\"");
        let status: EntityStatus = serde_json::from_str("\"RECOVERING\"").unwrap();
        assert_eq!(status, EntityStatus::Recovering);
        assert_eq!(EntityStatus::Running.to_string(), "RUNNING");
    }

    #[test]
    fn only_offloaded_is_terminal() {
        assert!(EntityStatus::Offloaded.is_terminal());
        assert!(!EntityStatus::Invalid.is_terminal());
        assert!(!EntityStatus::Error.is_terminal());
    }

    #[test]
    fn reconcilable_states() {
        assert!(EntityStatus::Running.is_reconcilable());
        assert!(EntityStatus::Error.is_reconcilable());
        assert!(!EntityStatus::Invalid.is_reconcilable());
        assert!(!EntityStatus::Stopping.is_reconcilable());
    }

    #[test]
    fn fdu_state_classification() {
        assert_eq!(FduState::Run.health(), FduHealth::Healthy);
        assert_eq!(FduState::Configure.health(), FduHealth::Transitional);
        assert_eq!(FduState::Pause.health(), FduHealth::Unhealthy);
        assert_eq!(FduState::Error.health(), FduHealth::Unhealthy);
        assert_eq!(FduState::Migrate.health(), FduHealth::Unknown);
    }

    #[test]
    fn fdu_state_take_off_name() {
        let json = serde_json::to_string(&FduState::TakeOff).unwrap();
        assert_eq!(json, "\"TAKE_OFF\"");
    }

    #[test]
    fn new_record_starts_onboarding() {
        let record = EntityRecord::new("e1", "i1", Some("fim".to_string()), None);
        assert_eq!(record.status, EntityStatus::Onboarding);
        assert!(record.fdus.is_empty());
        assert_eq!(record.table_key(), "e1/i1");
    }
}
