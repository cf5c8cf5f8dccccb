//! force.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForceConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// FIMs bound at startup, `[[fims]]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fims: Vec<FimBinding>,
    /// Kubernetes clusters bound at startup, `[[clouds]]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clouds: Vec<CloudBinding>,
}

/// Tunables of the job queue, the workers and the monitoring loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Capacity of the bounded job queue.
    pub queue_capacity: usize,
    /// Sleep between two monitoring jobs of one instance.
    #[serde(with = "duration_str")]
    pub monitor_interval: Duration,
    /// Cap on concurrently executing workers. Unset means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_workers: Option<usize>,
    /// How long a worker waits for a backend resource to converge.
    #[serde(with = "duration_str")]
    pub convergence_timeout: Duration,
    /// Interval between two convergence checks.
    #[serde(with = "duration_str")]
    pub convergence_poll: Duration,
    /// Kubernetes namespace for cloud FDUs.
    pub cloud_namespace: String,
    /// How long the `test` job pretends to work.
    #[serde(with = "duration_str")]
    pub test_job_duration: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            monitor_interval: Duration::from_secs(10),
            max_concurrent_workers: None,
            convergence_timeout: Duration::from_secs(30),
            convergence_poll: Duration::from_millis(200),
            cloud_namespace: "default".to_string(),
            test_job_duration: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("force.redb"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` env-filter directive; `RUST_LOG` wins when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn default_uuid() -> String {
    crate::DEFAULT_UUID.to_string()
}

/// A FIM the daemon binds to a tenant when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FimBinding {
    pub id: String,
    /// Endpoint of the FIM, e.g. `tcp/10.0.0.1:7447`.
    pub locator: String,
    #[serde(default = "default_uuid")]
    pub system: String,
    #[serde(default = "default_uuid")]
    pub tenant: String,
}

/// A Kubernetes cluster the daemon binds to a tenant when it starts.
/// The certificate files are optional; a missing one binds empty data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudBinding {
    pub id: String,
    /// kubeconfig file, YAML or JSON.
    pub kubeconfig: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    #[serde(default = "default_uuid")]
    pub system: String,
    #[serde(default = "default_uuid")]
    pub tenant: String,
}

impl ForceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ForceConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a human duration: `"250ms"`, `"10s"`, `"5m"`, `"1h"`. A bare
/// number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("invalid duration unit in {s:?}")),
    }
}

/// Render a duration in the unit `parse_duration` reads back exactly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        format!("{millis}ms")
    } else if millis % 60_000 != 0 || millis == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}m", millis / 60_000)
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let config: ForceConfig = toml::from_str("").unwrap();
        assert_eq!(config.orchestrator.queue_capacity, 1024);
        assert_eq!(config.orchestrator.monitor_interval, Duration::from_secs(10));
        assert_eq!(config.orchestrator.cloud_namespace, "default");
        assert!(config.orchestrator.max_concurrent_workers.is_none());
        assert_eq!(config.store.path, PathBuf::from("force.redb"));
        assert!(config.log.filter.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let toml_str = r#"
[orchestrator]
queue_capacity = 8
monitor_interval = "500ms"
convergence_timeout = "2m"
max_concurrent_workers = 4

[store]
path = "/var/lib/force/state.redb"

[log]
filter = "debug"
"#;
        let config: ForceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.orchestrator.queue_capacity, 8);
        assert_eq!(config.orchestrator.monitor_interval, Duration::from_millis(500));
        assert_eq!(config.orchestrator.convergence_timeout, Duration::from_secs(120));
        assert_eq!(config.orchestrator.max_concurrent_workers, Some(4));
        assert_eq!(config.orchestrator.convergence_poll, Duration::from_millis(200));
        assert_eq!(config.log.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_parse_bindings() {
        let toml_str = r#"
[[fims]]
id = "fim-1"
locator = "tcp/10.0.0.1:7447"

[[fims]]
id = "fim-2"
locator = "tcp/10.0.0.2:7447"
system = "edge"
tenant = "acme"

[[clouds]]
id = "k8s"
kubeconfig = "/etc/force/k8s.yaml"
ca = "/etc/force/ca.crt"
"#;
        let config: ForceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fims.len(), 2);
        assert_eq!(config.fims[0].system, crate::DEFAULT_UUID);
        assert_eq!(config.fims[0].tenant, crate::DEFAULT_UUID);
        assert_eq!(config.fims[1].tenant, "acme");
        assert_eq!(config.clouds[0].kubeconfig, PathBuf::from("/etc/force/k8s.yaml"));
        assert_eq!(config.clouds[0].ca, Some(PathBuf::from("/etc/force/ca.crt")));
        assert!(config.clouds[0].cert.is_none());

        let back: ForceConfig = toml::from_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(back.fims, config.fims);
        assert_eq!(back.clouds, config.clouds);
    }

    #[test]
    fn test_fim_binding_needs_locator() {
        assert!(toml::from_str::<ForceConfig>("[[fims]]\nid = \"fim-1\"\n").is_err());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let toml_str = r#"
[orchestrator]
monitor_interval = "soon"
"#;
        assert!(toml::from_str::<ForceConfig>(toml_str).is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_to_toml_string_reads_back() {
        let config = ForceConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("monitor_interval = \"10s\""));
        assert!(toml_str.contains("convergence_poll = \"200ms\""));
        let back: ForceConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.orchestrator.test_job_duration, Duration::from_secs(45));
    }
}
