//! Bounded job queue between the facade and the dispatch loop.

use force_core::Job;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// A job together with the tenant it runs for.
#[derive(Debug, Clone)]
pub struct EnqueuedJob {
    pub job: Job,
    pub system_id: String,
    pub tenant_id: String,
}

/// Sending half of the queue. Enqueueing never blocks.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<EnqueuedJob>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` jobs (at least one).
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EnqueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Hand the job back when the queue is full or the dispatcher is gone.
    pub fn try_enqueue(&self, job: EnqueuedJob) -> Result<(), EnqueuedJob> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err(job),
            Err(TrySendError::Closed(job)) => {
                warn!(job_id = %job.job.job_id, "job queue is closed");
                Err(job)
            }
        }
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use force_core::JobPayload;

    fn job(id: &str) -> EnqueuedJob {
        EnqueuedJob {
            job: Job::queued(id.to_string(), "test".to_string(), JobPayload::Test),
            system_id: "sys".to_string(),
            tenant_id: "tenant".to_string(),
        }
    }

    #[tokio::test]
    async fn full_queue_hands_job_back() {
        let (queue, mut rx) = JobQueue::new(2);
        queue.try_enqueue(job("a")).unwrap();
        queue.try_enqueue(job("b")).unwrap();
        assert_eq!(queue.available(), 0);

        let rejected = queue.try_enqueue(job("c")).unwrap_err();
        assert_eq!(rejected.job.job_id, "c");

        assert_eq!(rx.recv().await.unwrap().job.job_id, "a");
        queue.try_enqueue(job("c")).unwrap();
    }

    #[tokio::test]
    async fn zero_capacity_still_holds_one() {
        let (queue, _rx) = JobQueue::new(0);
        queue.try_enqueue(job("a")).unwrap();
        assert!(queue.try_enqueue(job("b")).is_err());
    }

    #[tokio::test]
    async fn closed_queue_rejects() {
        let (queue, rx) = JobQueue::new(4);
        drop(rx);
        assert!(queue.try_enqueue(job("a")).is_err());
    }
}
