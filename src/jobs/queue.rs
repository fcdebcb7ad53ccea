use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::instrument;
use uuid::Uuid;

use crate::models::Recipient;
use crate::telemetry::GENERATION_QUEUE_REJECTED;

/// One report waiting for a generation worker.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub report_id: Uuid,
    pub tenant_id: String,
    pub recipients: Vec<Recipient>,
    pub scheduled_report_id: Option<Uuid>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("generation queue is full")]
    Full,

    #[error("generation queue is closed")]
    Closed,
}

/// Bounded in-process hand-off between report creation and the workers.
/// Submission never waits: a full queue is reported to the caller.
#[derive(Clone)]
pub struct GenerationQueue {
    tx: mpsc::Sender<GenerationJob>,
}

impl GenerationQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<GenerationJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    #[instrument(name = "job.enqueue", skip(self, job), fields(report_id = %job.report_id))]
    pub fn submit(&self, job: GenerationJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| {
            GENERATION_QUEUE_REJECTED.add(1, &[]);
            match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Closed(_) => QueueError::Closed,
            }
        })
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> GenerationJob {
        GenerationJob {
            report_id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            recipients: vec![],
            scheduled_report_id: None,
        }
    }

    #[tokio::test]
    async fn test_submit_delivers_in_order() {
        let (queue, mut rx) = GenerationQueue::bounded(4);
        let first = job();
        let second = job();
        queue.submit(first.clone()).unwrap();
        queue.submit(second.clone()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
    }

    #[test]
    fn test_full_queue_rejects() {
        let (queue, _rx) = GenerationQueue::bounded(1);
        queue.submit(job()).unwrap();
        assert_eq!(queue.submit(job()), Err(QueueError::Full));
    }

    #[test]
    fn test_closed_queue_rejects() {
        let (queue, rx) = GenerationQueue::bounded(1);
        drop(rx);
        assert_eq!(queue.submit(job()), Err(QueueError::Closed));
    }
}
