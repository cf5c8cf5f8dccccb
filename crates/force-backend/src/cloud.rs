//! Kubernetes ("cloud") client interface, Deployment manifests and
//! cluster credentials.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};

/// An `apps/v1` Deployment. Only the fields FOrcE reads are typed; the
/// rest of the spec is carried through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentSpec,
}

fn default_api_version() -> String {
    "apps/v1".to_string()
}

fn default_kind() -> String {
    "Deployment".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploymentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Deployment {
    /// Decode the base64 YAML or JSON manifest carried in an FDU's
    /// `hypervisor_specific` field.
    pub fn from_encoded(blob: &str) -> BackendResult<Self> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| BackendError::Decode(format!("deployment is not base64: {e}")))?;
        // YAML is a superset of JSON, one parser covers both.
        serde_yaml::from_slice(&raw)
            .map_err(|e| BackendError::Decode(format!("invalid deployment manifest: {e}")))
    }

    /// Desired replicas; Kubernetes defaults an unset count to one.
    pub fn desired_replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploymentStatus {
    pub replicas: i32,
    pub available_replicas: i32,
}

/// A Deployment as reported by the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentState {
    pub deployment: Deployment,
    pub status: DeploymentStatus,
}

impl DeploymentState {
    pub fn is_available(&self) -> bool {
        self.status.available_replicas >= self.deployment.desired_replicas()
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// Connection material for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudCredentials {
    /// Parsed kubeconfig (or flat REST config).
    pub config: serde_json::Value,
    #[serde(with = "b64", default)]
    pub ca_data: Vec<u8>,
    #[serde(with = "b64", default)]
    pub cert_data: Vec<u8>,
    #[serde(with = "b64", default)]
    pub key_data: Vec<u8>,
}

impl CloudCredentials {
    pub fn from_kubeconfig(
        config: &str,
        ca_data: &[u8],
        cert_data: &[u8],
        key_data: &[u8],
    ) -> BackendResult<Self> {
        let config: serde_json::Value = serde_yaml::from_str(config)
            .map_err(|e| BackendError::Decode(format!("invalid cluster config: {e}")))?;
        if !config.is_object() {
            return Err(BackendError::Decode(
                "cluster config must be a mapping".to_string(),
            ));
        }
        Ok(Self {
            config,
            ca_data: ca_data.to_vec(),
            cert_data: cert_data.to_vec(),
            key_data: key_data.to_vec(),
        })
    }

    /// API server address: `host` of a flat REST config, or the first
    /// cluster's `server` of a kubeconfig.
    pub fn server(&self) -> Option<&str> {
        self.config
            .get("host")
            .and_then(|v| v.as_str())
            .or_else(|| {
                self.config
                    .get("clusters")?
                    .get(0)?
                    .get("cluster")?
                    .get("server")?
                    .as_str()
            })
    }

    pub fn to_json(&self) -> BackendResult<String> {
        serde_json::to_string(self).map_err(|e| BackendError::Decode(e.to_string()))
    }

    pub fn from_json(raw: &str) -> BackendResult<Self> {
        serde_json::from_str(raw).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}

// ── Client ────────────────────────────────────────────────────────

/// Deployment operations against one cluster.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> BackendResult<Deployment>;
    async fn get_deployment(&self, namespace: &str, name: &str) -> BackendResult<DeploymentState>;
    async fn delete_deployment(&self, namespace: &str, name: &str) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx
  labels:
    app: nginx
spec:
  replicas: 3
  selector:
    matchLabels:
      app: nginx
";

    #[test]
    fn decode_yaml_manifest() {
        let deployment = Deployment::from_encoded(&STANDARD.encode(YAML)).unwrap();
        assert_eq!(deployment.metadata.name, "nginx");
        assert_eq!(deployment.metadata.labels["app"], "nginx");
        assert_eq!(deployment.desired_replicas(), 3);
        assert!(deployment.spec.extra.contains_key("selector"));
    }

    #[test]
    fn decode_json_manifest() {
        let json = r#"{"metadata": {"name": "web"}, "spec": {"template": {}}}"#;
        let deployment = Deployment::from_encoded(&STANDARD.encode(json)).unwrap();
        assert_eq!(deployment.api_version, "apps/v1");
        assert_eq!(deployment.kind, "Deployment");
        assert_eq!(deployment.desired_replicas(), 1);
    }

    #[test]
    fn reject_bad_manifests() {
        assert!(matches!(
            Deployment::from_encoded("%%% not base64"),
            Err(BackendError::Decode(_))
        ));
        assert!(matches!(
            Deployment::from_encoded(&STANDARD.encode("just a string")),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn credentials_round_trip() {
        let kubeconfig = "\
clusters:
- name: edge
  cluster:
    server: https://10.0.0.1:6443
";
        let creds = CloudCredentials::from_kubeconfig(kubeconfig, b"ca", b"cert", b"key").unwrap();
        assert_eq!(creds.server(), Some("https://10.0.0.1:6443"));

        let json = creds.to_json().unwrap();
        let back = CloudCredentials::from_json(&json).unwrap();
        assert_eq!(back, creds);
        assert_eq!(back.key_data, b"key");
    }

    #[test]
    fn flat_rest_config_host() {
        let creds = CloudCredentials::from_kubeconfig(r#"{"host": "https://k8s"}"#, b"", b"", b"")
            .unwrap();
        assert_eq!(creds.server(), Some("https://k8s"));
        assert!(CloudCredentials::from_kubeconfig("just text", b"", b"", b"").is_err());
    }
}
