//! The transport seam.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{BusResult, FetchError};
use crate::message::{Headers, Message, Subscription};

/// Durable work queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// Stream name.
    pub stream: String,
    /// Subjects bound to the stream.
    pub subjects: Vec<String>,
    /// Durable pull consumer name.
    pub consumer: String,
    /// Deliveries per message before the broker gives up.
    pub max_deliver: u32,
}

/// How a fetched task is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done; remove from the queue.
    Ack,
    /// Failed; redeliver unless the delivery cap is reached.
    Nak,
    /// Never redeliver.
    Term,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ack => "ack",
            Self::Nak => "nak",
            Self::Term => "term",
        })
    }
}

/// Broker-specific acknowledgement handle.
#[async_trait]
pub trait Settle: Send {
    /// Report the outcome of one delivery.
    async fn settle(self: Box<Self>, disposition: Disposition) -> BusResult<()>;
}

/// One delivery of a queued task.
pub struct Delivery {
    /// The task message.
    pub message: Message,
    /// Delivery attempt, starting at 1.
    pub delivered: u64,
    settler: Box<dyn Settle>,
}

impl Delivery {
    /// Wrap a message with its acknowledgement handle.
    #[must_use]
    pub fn new(message: Message, delivered: u64, settler: Box<dyn Settle>) -> Self {
        Self {
            message,
            delivered,
            settler,
        }
    }

    /// Ack, nak or term this delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker did not accept the acknowledgement.
    pub async fn settle(self, disposition: Disposition) -> BusResult<()> {
        self.settler.settle(disposition).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.message.subject)
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}

/// A message broker offering request/reply and one durable work queue.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Subscribe to a subject or wildcard pattern.
    async fn subscribe(&self, subject: &str) -> BusResult<Subscription>;

    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, headers: Headers, payload: Bytes) -> BusResult<()>;

    /// Publish and wait for a single reply.
    async fn request(
        &self,
        subject: &str,
        headers: Headers,
        payload: Bytes,
        timeout: Duration,
    ) -> BusResult<Message>;

    /// Create or update the work queue stream and its consumer.
    async fn ensure_stream(&self, spec: &StreamSpec) -> BusResult<()>;

    /// Durably enqueue a task.
    async fn submit_task(&self, subject: &str, headers: Headers, payload: Bytes) -> BusResult<()>;

    /// Pull one task, waiting at most `max_wait`.
    async fn fetch_task(&self, max_wait: Duration) -> Result<Delivery, FetchError>;

    /// Stop serving; pending fetches end with [`FetchError::Closed`].
    async fn close(&self) -> BusResult<()>;
}

/// Reply to `request` on its reply address.
///
/// # Errors
///
/// Returns an error if the request carries no reply address or the publish
/// fails.
pub async fn reply(
    broker: &dyn Broker,
    request: &Message,
    headers: Headers,
    payload: Bytes,
) -> BusResult<()> {
    let Some(reply_to) = request.reply.as_deref() else {
        return Err(crate::BusError::Publish {
            subject: request.subject.clone(),
            reason: "request has no reply address".to_owned(),
        });
    };
    broker.publish(reply_to, headers, payload).await
}
