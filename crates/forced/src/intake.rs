//! Job intake — `RequestNewJobMessage` JSON lines in, one
//! `ReplyNewJobMessage` JSON line out per request.
//!
//! Blank lines are ignored. A line that is not a request, or a request
//! the orchestrator refuses outright (unknown system or tenant), is
//! logged and produces no reply.

use force_core::RequestNewJobMessage;
use force_orchestrator::Orchestrator;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// System and tenant the requests of this intake are filed under.
#[derive(Debug, Clone)]
pub struct Target {
    pub system_id: String,
    pub tenant_id: String,
}

/// Serve requests until the reader hits EOF or `shutdown` flips.
/// Returns the number of replies written.
pub async fn serve<R, W>(
    orchestrator: &Orchestrator,
    target: &Target,
    reader: R,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut replies = 0;
    info!(system_id = %target.system_id, tenant_id = %target.tenant_id, "job intake open");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.changed() => {
                debug!("job intake interrupted");
                break;
            }
        };
        let Some(line) = line else {
            debug!("job intake reached end of input");
            break;
        };

        if let Some(reply) = handle_line(orchestrator, target, &line).await {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            replies += 1;
        }
    }
    Ok(replies)
}

/// Turn one input line into the reply line, if any.
pub async fn handle_line(orchestrator: &Orchestrator, target: &Target, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let request: RequestNewJobMessage = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "ignoring malformed job request");
            return None;
        }
    };

    let kind = request.job_kind.clone();
    let reply = match orchestrator
        .insert_new_job(&target.system_id, &target.tenant_id, request)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(%kind, error = %e, "job request refused");
            return None;
        }
    };
    if !reply.accepted {
        warn!(%kind, sender = %reply.original_sender, "job queue full");
    }

    match serde_json::to_string(&reply) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            warn!(job_id = %reply.job_id, error = %e, "cannot encode reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use force_backend::SimulatedBackends;
    use force_core::{DEFAULT_UUID, JobStatus, OrchestratorConfig, ReplyNewJobMessage};
    use force_state::StateStore;

    async fn orchestrator(queue_capacity: usize) -> Orchestrator {
        let config = OrchestratorConfig {
            queue_capacity,
            ..Default::default()
        };
        Orchestrator::new(
            config,
            StateStore::open_in_memory().unwrap(),
            Arc::new(SimulatedBackends::default()),
        )
        .await
        .unwrap()
    }

    fn default_target() -> Target {
        Target {
            system_id: DEFAULT_UUID.to_string(),
            tenant_id: DEFAULT_UUID.to_string(),
        }
    }

    fn replies(output: &[u8]) -> Vec<ReplyNewJobMessage> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn accepted_request_is_answered_and_stored() {
        let orchestrator = orchestrator(16).await;
        let target = default_target();
        let input = concat!(
            r#"{"sender":"cli","job_kind":"test","body":""}"#,
            "\n",
            r#"{"sender":"ui","job_kind":"onboard","body":"{}"}"#,
            "\n",
        );
        let mut output = Vec::new();
        let (_tx, rx) = watch::channel(false);

        let written = serve(&orchestrator, &target, input.as_bytes(), &mut output, rx)
            .await
            .unwrap();
        assert_eq!(written, 2);

        let replies = replies(&output);
        assert_eq!(replies[0].original_sender, "cli");
        assert_eq!(replies[1].original_sender, "ui");
        assert!(replies.iter().all(|r| r.accepted));

        let job = orchestrator
            .get_job(DEFAULT_UUID, DEFAULT_UUID, &replies[0].job_id)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.original_sender, "cli");
    }

    #[tokio::test]
    async fn junk_lines_are_skipped() {
        let orchestrator = orchestrator(16).await;
        let target = default_target();
        let input = "\n   \nnot json\n{\"sender\":\"cli\"}\n{\"sender\":\"cli\",\"job_kind\":\"test\",\"body\":\"\"}\n";
        let mut output = Vec::new();
        let (_tx, rx) = watch::channel(false);

        let written = serve(&orchestrator, &target, input.as_bytes(), &mut output, rx)
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(replies(&output).len(), 1);
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let orchestrator = orchestrator(1).await;
        let target = default_target();
        let line = r#"{"sender":"cli","job_kind":"test","body":""}"#;

        let first = handle_line(&orchestrator, &target, line).await.unwrap();
        let second = handle_line(&orchestrator, &target, line).await.unwrap();
        let first: ReplyNewJobMessage = serde_json::from_str(&first).unwrap();
        let second: ReplyNewJobMessage = serde_json::from_str(&second).unwrap();
        assert!(first.accepted);
        assert!(!second.accepted);
    }

    #[tokio::test]
    async fn unknown_tenant_gets_no_reply() {
        let orchestrator = orchestrator(16).await;
        let target = Target {
            system_id: DEFAULT_UUID.to_string(),
            tenant_id: "nobody".to_string(),
        };
        let line = r#"{"sender":"cli","job_kind":"test","body":""}"#;
        assert!(handle_line(&orchestrator, &target, line).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_intake() {
        let orchestrator = orchestrator(16).await;
        let target = default_target();
        let (reader, _writer_end) = tokio::io::duplex(64);
        let (tx, rx) = watch::channel(false);

        let intake = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let mut output = Vec::new();
                serve(
                    &orchestrator,
                    &target,
                    tokio::io::BufReader::new(reader),
                    &mut output,
                    rx,
                )
                .await
            })
        };
        tx.send(true).unwrap();
        assert_eq!(intake.await.unwrap().unwrap(), 0);
    }
}
