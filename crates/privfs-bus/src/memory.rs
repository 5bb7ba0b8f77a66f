//! In-process broker for tests and local runs.
//!
//! Core publish/subscribe rides on a tokio broadcast channel with NATS-style
//! subject filtering. The work queue mimics a JetStream work-queue stream with
//! one pull consumer: explicit acks, immediate redelivery on nak, and a
//! delivery cap after which a message is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{Mutex, Notify, broadcast};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::broker::{Broker, Delivery, Disposition, Settle, StreamSpec};
use crate::error::{BusError, BusResult, FetchError};
use crate::message::{Headers, Message, Subscription};
use crate::subjects::subject_matches;

/// Default broadcast capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Work queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Waiting to be fetched.
    pub pending: usize,
    /// Fetched but not yet settled.
    pub in_flight: usize,
    /// Acknowledged.
    pub acked: u64,
    /// Negatively acknowledged (each nak counts).
    pub naked: u64,
    /// Terminated.
    pub terminated: u64,
    /// Dropped after reaching the delivery cap.
    pub exhausted: u64,
}

#[derive(Debug)]
struct Pending {
    id: u64,
    message: Message,
    delivered: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    spec: Option<StreamSpec>,
    ready: VecDeque<Pending>,
    in_flight: HashMap<u64, Pending>,
    next_id: u64,
    stats: QueueStats,
}

#[derive(Debug, Default)]
struct Queue {
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
}

/// In-memory [`Broker`].
///
/// Clones share the same subjects and queue.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    sender: broadcast::Sender<Message>,
    queue: Arc<Queue>,
}

impl MemoryBroker {
    /// Broker with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Broker with a given broadcast capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            queue: Arc::new(Queue::default()),
        }
    }

    /// Snapshot of the work queue counters.
    pub async fn queue_stats(&self) -> QueueStats {
        let state = self.queue.state.lock().await;
        QueueStats {
            pending: state.ready.len(),
            in_flight: state.in_flight.len(),
            ..state.stats
        }
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.queue.closed.load(Ordering::SeqCst) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    fn subscription(&self, pattern: &str) -> Subscription {
        let receiver = self.sender.subscribe();
        let filter = pattern.to_owned();
        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let filter = filter.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) if subject_matches(&filter, &message.subject) => {
                            return Some((message, receiver));
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(count)) => {
                            warn!(pattern = %filter, skipped = count, "subscriber lagged, messages dropped");
                        },
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Subscription::new(pattern, stream.boxed())
    }

    async fn next_task(&self) -> Result<Delivery, FetchError> {
        loop {
            let notified = self.queue.notify.notified();
            if self.queue.closed.load(Ordering::SeqCst) {
                return Err(FetchError::Closed);
            }
            {
                let mut state = self.queue.state.lock().await;
                if let Some(mut pending) = state.ready.pop_front() {
                    pending.delivered = pending.delivered.saturating_add(1);
                    let delivery = Delivery::new(
                        pending.message.clone(),
                        pending.delivered,
                        Box::new(MemorySettler {
                            queue: Arc::clone(&self.queue),
                            id: pending.id,
                        }),
                    );
                    state.in_flight.insert(pending.id, pending);
                    return Ok(delivery);
                }
            }
            notified.await;
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, subject: &str) -> BusResult<Subscription> {
        self.ensure_open()?;
        Ok(self.subscription(subject))
    }

    async fn publish(&self, subject: &str, headers: Headers, payload: Bytes) -> BusResult<()> {
        self.ensure_open()?;
        let receivers = self
            .sender
            .send(Message::new(subject, headers, payload))
            .unwrap_or(0);
        trace!(subject, receivers, "published");
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        headers: Headers,
        payload: Bytes,
        timeout: Duration,
    ) -> BusResult<Message> {
        self.ensure_open()?;
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut replies = self.subscription(&inbox);

        let mut message = Message::new(subject, headers, payload);
        message.reply = Some(inbox);
        if self.sender.send(message).is_err() {
            return Err(BusError::NoResponders(subject.to_owned()));
        }

        match tokio::time::timeout(timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout(subject.to_owned())),
        }
    }

    async fn ensure_stream(&self, spec: &StreamSpec) -> BusResult<()> {
        self.ensure_open()?;
        let mut state = self.queue.state.lock().await;
        debug!(stream = %spec.stream, subjects = ?spec.subjects, "stream ensured");
        state.spec = Some(spec.clone());
        Ok(())
    }

    async fn submit_task(&self, subject: &str, headers: Headers, payload: Bytes) -> BusResult<()> {
        self.ensure_open()?;
        let mut state = self.queue.state.lock().await;
        let accepted = state
            .spec
            .as_ref()
            .is_some_and(|spec| spec.subjects.iter().any(|p| subject_matches(p, subject)));
        if !accepted {
            return Err(BusError::NoStream(subject.to_owned()));
        }

        let id = state.next_id;
        state.next_id = id.saturating_add(1);
        state.ready.push_back(Pending {
            id,
            message: Message::new(subject, headers, payload),
            delivered: 0,
        });
        drop(state);

        self.queue.notify.notify_one();
        Ok(())
    }

    async fn fetch_task(&self, max_wait: Duration) -> Result<Delivery, FetchError> {
        match tokio::time::timeout(max_wait, self.next_task()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    async fn close(&self) -> BusResult<()> {
        self.queue.closed.store(true, Ordering::SeqCst);
        self.queue.notify.notify_waiters();
        Ok(())
    }
}

struct MemorySettler {
    queue: Arc<Queue>,
    id: u64,
}

#[async_trait]
impl Settle for MemorySettler {
    async fn settle(self: Box<Self>, disposition: Disposition) -> BusResult<()> {
        let mut state = self.queue.state.lock().await;
        let pending = state
            .in_flight
            .remove(&self.id)
            .ok_or_else(|| BusError::Settle(format!("delivery {} already settled", self.id)))?;
        let max_deliver = state
            .spec
            .as_ref()
            .map_or(u64::MAX, |spec| u64::from(spec.max_deliver));

        match disposition {
            Disposition::Ack => state.stats.acked = state.stats.acked.saturating_add(1),
            Disposition::Term => {
                state.stats.terminated = state.stats.terminated.saturating_add(1);
            },
            Disposition::Nak => {
                state.stats.naked = state.stats.naked.saturating_add(1);
                if pending.delivered >= max_deliver {
                    debug!(id = pending.id, delivered = pending.delivered, "delivery cap reached");
                    state.stats.exhausted = state.stats.exhausted.saturating_add(1);
                } else {
                    state.ready.push_back(pending);
                    drop(state);
                    self.queue.notify.notify_one();
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> StreamSpec {
        StreamSpec {
            stream: "TASKS".into(),
            subjects: vec!["t.fs.*".into()],
            consumer: "worker".into(),
            max_deliver: 3,
        }
    }

    #[tokio::test]
    async fn publish_reaches_matching_subscribers_only() {
        let broker = MemoryBroker::new();
        let mut jobs = broker.subscribe("ev.job.*").await.unwrap();
        let mut other = broker.subscribe("ev.other").await.unwrap();

        broker
            .publish("ev.job.1", Headers::new(), Bytes::from_static(b"x"))
            .await
            .unwrap();

        let got = jobs.next().await.unwrap();
        assert_eq!(got.subject, "ev.job.1");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), other.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let broker = MemoryBroker::new();
        let mut requests = broker.subscribe("svc.echo").await.unwrap();
        let responder = broker.clone();
        tokio::spawn(async move {
            let req = requests.next().await.unwrap();
            crate::broker::reply(&responder, &req, Headers::new(), req.payload.clone())
                .await
                .unwrap();
        });

        let reply = broker
            .request(
                "svc.echo",
                Headers::new(),
                Bytes::from_static(b"ping"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply.payload, Bytes::from_static(b"ping"));
    }

    #[tokio::test]
    async fn request_without_listener_times_out() {
        let broker = MemoryBroker::new();
        let _someone = broker.subscribe("unrelated").await.unwrap();
        let err = broker
            .request(
                "svc.nobody",
                Headers::new(),
                Bytes::new(),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Timeout("svc.nobody".into()));
    }

    #[tokio::test]
    async fn submit_requires_stream() {
        let broker = MemoryBroker::new();
        let err = broker
            .submit_task("t.fs.mkdir", Headers::new(), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoStream("t.fs.mkdir".into()));

        broker.ensure_stream(&spec()).await.unwrap();
        broker
            .submit_task("t.fs.mkdir", Headers::new(), Bytes::new())
            .await
            .unwrap();
        assert!(matches!(
            broker
                .submit_task("elsewhere", Headers::new(), Bytes::new())
                .await,
            Err(BusError::NoStream(_))
        ));
    }

    #[tokio::test]
    async fn ack_removes_task() {
        let broker = MemoryBroker::new();
        broker.ensure_stream(&spec()).await.unwrap();
        broker
            .submit_task("t.fs.copy", Headers::new(), Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let delivery = broker.fetch_task(Duration::from_secs(1)).await.unwrap();
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.message.subject, "t.fs.copy");
        delivery.settle(Disposition::Ack).await.unwrap();

        let stats = broker.queue_stats().await;
        assert_eq!(stats.acked, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(
            broker.fetch_task(Duration::from_millis(20)).await.unwrap_err(),
            FetchError::Timeout
        );
    }

    #[tokio::test]
    async fn nak_redelivers_until_cap() {
        let broker = MemoryBroker::new();
        broker.ensure_stream(&spec()).await.unwrap();
        broker
            .submit_task("t.fs.move", Headers::new(), Bytes::new())
            .await
            .unwrap();

        for attempt in 1..=3 {
            let delivery = broker.fetch_task(Duration::from_secs(1)).await.unwrap();
            assert_eq!(delivery.delivered, attempt);
            delivery.settle(Disposition::Nak).await.unwrap();
        }

        let stats = broker.queue_stats().await;
        assert_eq!(stats.naked, 3);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(
            broker.fetch_task(Duration::from_millis(20)).await.unwrap_err(),
            FetchError::Timeout
        );
    }

    #[tokio::test]
    async fn term_never_redelivers() {
        let broker = MemoryBroker::new();
        broker.ensure_stream(&spec()).await.unwrap();
        broker
            .submit_task("t.fs.delete", Headers::new(), Bytes::new())
            .await
            .unwrap();

        let delivery = broker.fetch_task(Duration::from_secs(1)).await.unwrap();
        delivery.settle(Disposition::Term).await.unwrap();
        assert_eq!(broker.queue_stats().await.terminated, 1);
        assert!(broker.fetch_task(Duration::from_millis(20)).await.is_err());
    }

    #[tokio::test]
    async fn fetch_wakes_on_submit() {
        let broker = MemoryBroker::new();
        broker.ensure_stream(&spec()).await.unwrap();
        let fetcher = broker.clone();
        let pending = tokio::spawn(async move { fetcher.fetch_task(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker
            .submit_task("t.fs.chmod", Headers::new(), Bytes::new())
            .await
            .unwrap();

        let delivery = pending.await.unwrap().unwrap();
        assert_eq!(delivery.message.subject, "t.fs.chmod");
    }

    #[tokio::test]
    async fn close_ends_fetches() {
        let broker = MemoryBroker::new();
        broker.ensure_stream(&spec()).await.unwrap();
        let fetcher = broker.clone();
        let pending = tokio::spawn(async move { fetcher.fetch_task(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.close().await.unwrap();
        assert_eq!(pending.await.unwrap().unwrap_err(), FetchError::Closed);
        assert_eq!(
            broker
                .publish("x", Headers::new(), Bytes::new())
                .await
                .unwrap_err(),
            BusError::Closed
        );
    }
}
