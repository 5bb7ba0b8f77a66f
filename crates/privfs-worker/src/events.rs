//! Job result publisher.

use std::sync::Arc;

use bytes::Bytes;
use privfs_bus::{Broker, BusError, BusResult, Headers, JobEvent, Subjects};
use privfs_core::{FsResult, OperationOutput};
use serde_json::Value;
use tracing::debug;

/// Event describing one attempt at a job.
#[must_use]
pub fn job_event(job_id: &str, outcome: &FsResult<OperationOutput>) -> JobEvent {
    match outcome {
        Ok(output) => JobEvent::completed(job_id, output.to_json().unwrap_or(Value::Null)),
        Err(e) => JobEvent::failed(job_id, e),
    }
}

/// Publishes job events on `<events_root>.job.<jobId>`.
#[derive(Clone)]
pub struct JobPublisher {
    broker: Arc<dyn Broker>,
    subjects: Subjects,
}

impl JobPublisher {
    /// Publisher on `broker`.
    pub fn new(broker: Arc<dyn Broker>, subjects: Subjects) -> Self {
        Self { broker, subjects }
    }

    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] if the event cannot be encoded or published.
    pub async fn publish(&self, event: &JobEvent) -> BusResult<()> {
        let subject = self.subjects.job_event(&event.job_id);
        let body = serde_json::to_vec(event).map_err(|e| BusError::Publish {
            subject: subject.clone(),
            reason: e.to_string(),
        })?;
        self.broker
            .publish(&subject, Headers::new(), Bytes::from(body))
            .await?;
        debug!(%subject, status = ?event.status, "job event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use privfs_bus::{JobStatus, MemoryBroker};
    use privfs_core::{FsError, Relocated};
    use serde_json::json;

    use super::*;

    #[test]
    fn outcome_maps_to_event() {
        let done = job_event("j1", &Ok(OperationOutput::Relocated(Relocated::to("/srv/b"))));
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(json!({"ok": true, "dst": "/srv/b"})));

        let failed = job_event("j2", &Err(FsError::PermissionDenied));
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.code.as_deref(), Some("EACCES"));
        assert_eq!(failed.job_id, "j2");
    }

    #[tokio::test]
    async fn publishes_on_the_job_subject() {
        let broker = MemoryBroker::new();
        let subjects = Subjects::new("t.root", "t.events");
        let mut events = broker.subscribe("t.events.job.*").await.unwrap();

        let publisher = JobPublisher::new(Arc::new(broker.clone()), subjects);
        publisher
            .publish(&job_event("job-42", &Ok(OperationOutput::Done)))
            .await
            .unwrap();

        let message = events.next().await.unwrap();
        assert_eq!(message.subject, "t.events.job.job-42");
        let event: JobEvent = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(event, JobEvent::completed("job-42", json!({"ok": true})));
    }
}
