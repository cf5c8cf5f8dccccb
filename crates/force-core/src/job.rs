//! Jobs — asynchronous units of orchestration work.
//!
//! A request arrives as a kind string plus an opaque body. It is decoded
//! once, at submission, into a [`JobPayload`] so that workers receive a
//! typed payload. Requests that cannot be decoded still become jobs; they
//! run the error worker and end up `failed`.

use serde::{Deserialize, Serialize};

use crate::descriptor::EntityDescriptor;
use crate::types::EntityRecord;

/// Status of a job. `queued → running → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Kinds of job the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Test,
    Onboard,
    Offload,
    Instantiate,
    Teardown,
    Monitoring,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Test => "test",
            JobKind::Onboard => "onboard",
            JobKind::Offload => "offload",
            JobKind::Instantiate => "instantiate",
            JobKind::Teardown => "teardown",
            JobKind::Monitoring => "monitoring",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(JobKind::Test),
            "onboard" => Ok(JobKind::Onboard),
            "offload" => Ok(JobKind::Offload),
            "instantiate" => Ok(JobKind::Instantiate),
            "teardown" => Ok(JobKind::Teardown),
            "monitoring" => Ok(JobKind::Monitoring),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

/// Target of an offload, instantiate, teardown or monitoring job.
///
/// For offload and instantiate `uuid` is the entity descriptor UUID, for
/// teardown and monitoring it is the entity instance UUID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityAction {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fim_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
}

/// Typed job body, keyed by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum JobPayload {
    Test,
    Onboard(EntityDescriptor),
    Offload(EntityAction),
    Instantiate(EntityAction),
    Teardown(EntityAction),
    Monitoring(EntityAction),
    /// Unknown kind or undecodable body; runs the error worker.
    Unrecognized {
        kind: String,
        body: String,
        reason: String,
    },
}

impl JobPayload {
    /// Decode a raw request. Never fails: anything that cannot be decoded
    /// becomes [`JobPayload::Unrecognized`].
    pub fn decode(kind: &str, body: &str) -> Self {
        let unrecognized = |reason: String| JobPayload::Unrecognized {
            kind: kind.to_string(),
            body: body.to_string(),
            reason,
        };

        let job_kind = match kind.parse::<JobKind>() {
            Ok(k) => k,
            Err(reason) => return unrecognized(reason),
        };

        let decoded = match job_kind {
            JobKind::Test => Ok(JobPayload::Test),
            JobKind::Onboard => serde_json::from_str(body).map(JobPayload::Onboard),
            JobKind::Offload => serde_json::from_str(body).map(JobPayload::Offload),
            JobKind::Instantiate => serde_json::from_str(body).map(JobPayload::Instantiate),
            JobKind::Teardown => serde_json::from_str(body).map(JobPayload::Teardown),
            JobKind::Monitoring => serde_json::from_str(body).map(JobPayload::Monitoring),
        };

        decoded.unwrap_or_else(|e| unrecognized(format!("malformed {kind} body: {e}")))
    }

    pub fn kind(&self) -> Option<JobKind> {
        match self {
            JobPayload::Test => Some(JobKind::Test),
            JobPayload::Onboard(_) => Some(JobKind::Onboard),
            JobPayload::Offload(_) => Some(JobKind::Offload),
            JobPayload::Instantiate(_) => Some(JobKind::Instantiate),
            JobPayload::Teardown(_) => Some(JobKind::Teardown),
            JobPayload::Monitoring(_) => Some(JobKind::Monitoring),
            JobPayload::Unrecognized { .. } => None,
        }
    }

    /// Kind name for logging.
    pub fn kind_name(&self) -> &str {
        match self {
            JobPayload::Unrecognized { kind, .. } => kind,
            other => other.kind().map(JobKind::as_str).unwrap_or("unknown"),
        }
    }
}

/// A unit of orchestration work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub original_sender: String,
    pub status: JobStatus,
    pub payload: JobPayload,
    /// Latest snapshot of the entity instance this job works on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<EntityRecord>,
    /// Why the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// A freshly accepted job.
    pub fn queued(job_id: String, original_sender: String, payload: JobPayload) -> Self {
        Self {
            job_id,
            original_sender,
            status: JobStatus::Queued,
            payload,
            record: None,
            error: None,
        }
    }
}

/// Request from the front-end to run a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestNewJobMessage {
    pub sender: String,
    pub job_kind: String,
    pub body: String,
}

/// Reply to a [`RequestNewJobMessage`]. `accepted == false` means the
/// queue was full and the caller must retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyNewJobMessage {
    pub original_sender: String,
    pub job_id: String,
    pub accepted: bool,
}
