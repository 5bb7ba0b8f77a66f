//! The work-queue pull loop.
//!
//! One message at a time. Success is acked, a classified failure is naked
//! (the broker redelivers until its cap), and anything structurally wrong is
//! terminated so it can never loop.

use std::sync::Arc;
use std::time::Duration;

use privfs_bus::{Broker, Delivery, Disposition, FetchError, Subjects};
use privfs_core::{Envelope, ProtocolError, Transport, Verb};
use privfs_telemetry::RequestContext;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::events::{JobPublisher, job_event};

/// Pulls and runs queued jobs.
pub(crate) struct TaskLoop {
    broker: Arc<dyn Broker>,
    dispatcher: Arc<Dispatcher>,
    publisher: JobPublisher,
    subjects: Subjects,
    fetch_wait: Duration,
    backoff: Duration,
    max_deliver: u32,
}

impl TaskLoop {
    pub(crate) fn new(
        broker: Arc<dyn Broker>,
        dispatcher: Arc<Dispatcher>,
        subjects: Subjects,
        fetch_wait: Duration,
        backoff: Duration,
        max_deliver: u32,
    ) -> Self {
        Self {
            publisher: JobPublisher::new(Arc::clone(&broker), subjects.clone()),
            broker,
            dispatcher,
            subjects,
            fetch_wait,
            backoff,
            max_deliver,
        }
    }

    /// Run until cancelled or the broker reports the connection closed.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        info!(
            fetch_wait = ?self.fetch_wait,
            max_deliver = self.max_deliver,
            "task loop started"
        );
        loop {
            let fetched = tokio::select! {
                () = cancel.cancelled() => break,
                fetched = self.broker.fetch_task(self.fetch_wait) => fetched,
            };

            match fetched {
                Ok(delivery) => self.process(delivery).await,
                Err(FetchError::Timeout) => {},
                Err(FetchError::Closed) => {
                    info!("broker closed, task loop exiting");
                    break;
                },
                Err(FetchError::Other(reason)) => {
                    warn!(error = %reason, backoff = ?self.backoff, "fetch failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.backoff) => {},
                    }
                },
            }
        }
        info!("task loop stopped");
    }

    async fn process(&self, delivery: Delivery) {
        let subject = delivery.message.subject.clone();
        let delivered = delivery.delivered;

        let Some(verb) = self
            .subjects
            .verb_of(&subject)
            .filter(|v| v.transport() == Transport::Task)
        else {
            let e = ProtocolError::Unsupported(subject.clone());
            warn!(%subject, error = %e, "terminating task");
            settle(delivery, Disposition::Term).await;
            return;
        };

        let envelope = match Envelope::decode(verb, &delivery.message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%subject, delivered, error = %e, "terminating malformed task");
                settle(delivery, Disposition::Term).await;
                return;
            },
        };

        let ctx = RequestContext::new("tasks")
            .with_operation(verb.as_str())
            .with_job_id(envelope.job_id.as_deref())
            .with_account(envelope.account.as_deref());
        let span = ctx.span();
        self.run_job(verb, envelope, delivery, &ctx)
            .instrument(span)
            .await;
    }

    async fn run_job(
        &self,
        verb: Verb,
        envelope: Envelope,
        delivery: Delivery,
        ctx: &RequestContext,
    ) {
        let delivered = delivery.delivered;
        let job_id = envelope.job_id.clone();
        let outcome = self.dispatcher.dispatch(envelope).await;

        match job_id.as_deref() {
            Some(id) => {
                if let Err(e) = self.publisher.publish(&job_event(id, &outcome)).await {
                    warn!(error = %e, "job event not published");
                }
            },
            None => warn!(%verb, "task carries no job id, no event published"),
        }

        let disposition = match &outcome {
            Ok(_) => {
                info!(delivered, elapsed_ms = ctx.elapsed_ms(), "task completed");
                Disposition::Ack
            },
            Err(e) => {
                let last_attempt = delivered >= u64::from(self.max_deliver);
                warn!(
                    delivered,
                    max_deliver = self.max_deliver,
                    last_attempt,
                    code = e.code(),
                    error = %e,
                    "task failed"
                );
                Disposition::Nak
            },
        };
        settle(delivery, disposition).await;
    }
}

async fn settle(delivery: Delivery, disposition: Disposition) {
    let delivered = delivery.delivered;
    match delivery.settle(disposition).await {
        Ok(()) => debug!(%disposition, delivered, "task settled"),
        Err(e) => warn!(%disposition, delivered, error = %e, "settle failed"),
    }
}
