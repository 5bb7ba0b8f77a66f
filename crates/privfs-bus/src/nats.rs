//! NATS core request/reply plus a JetStream work-queue stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::jetstream::consumer::{AckPolicy, PullConsumer, pull};
use async_nats::jetstream::stream::{self as js_stream, RetentionPolicy};
use async_nats::jetstream::{self, AckKind};
use async_nats::{ConnectOptions, Event, HeaderMap, RequestErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Delivery, Disposition, Settle, StreamSpec};
use crate::envelope::{HEADER_META, HEADER_STATUS};
use crate::error::{BusError, BusResult, FetchError};
use crate::message::{Headers, Message, Subscription};

/// Headers copied from inbound NATS messages.
const KNOWN_HEADERS: [&str; 2] = [HEADER_META, HEADER_STATUS];

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct NatsSettings {
    /// Server URL, e.g. `nats://127.0.0.1:4222`.
    pub url: String,
    /// Account user.
    pub user: String,
    /// Account password.
    pub password: String,
    /// Fixed wait between reconnect attempts.
    pub reconnect_wait: Duration,
    /// Client name shown in server monitoring.
    pub client_name: String,
}

/// [`Broker`] backed by a NATS server with JetStream enabled.
pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    consumer: RwLock<Option<PullConsumer>>,
    closed: AtomicBool,
}

impl NatsBroker {
    /// Connect, retrying the initial connection and reconnecting forever.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connect`] if the options are rejected.
    pub async fn connect(settings: &NatsSettings) -> BusResult<Self> {
        let wait = settings.reconnect_wait;
        let client = ConnectOptions::new()
            .name(&settings.client_name)
            .user_and_password(settings.user.clone(), settings.password.clone())
            .retry_on_initial_connect()
            .max_reconnects(None::<usize>)
            .reconnect_delay_callback(move |_attempt| wait)
            .event_callback(|event| async move {
                match event {
                    Event::Connected => info!("broker connected"),
                    Event::Disconnected => warn!("broker disconnected, reconnecting"),
                    Event::Closed => warn!("broker connection closed"),
                    other => debug!(event = ?other, "broker event"),
                }
            })
            .connect(settings.url.as_str())
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        info!(url = %settings.url, "connected to broker");
        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            consumer: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

fn to_header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers.iter() {
        map.insert(name, value);
    }
    map
}

fn from_nats(message: &async_nats::Message) -> Message {
    let mut headers = Headers::new();
    if let Some(map) = &message.headers {
        for name in KNOWN_HEADERS {
            if let Some(value) = map.get(name) {
                headers.insert(name, value.as_str());
            }
        }
    }
    Message {
        subject: message.subject.to_string(),
        reply: message.reply.as_ref().map(ToString::to_string),
        headers,
        payload: message.payload.clone(),
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn subscribe(&self, subject: &str) -> BusResult<Subscription> {
        let subscriber = self
            .client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| BusError::Subscribe {
                subject: subject.to_owned(),
                reason: e.to_string(),
            })?;
        debug!(subject, "subscribed");
        Ok(Subscription::new(
            subject,
            subscriber.map(|m| from_nats(&m)).boxed(),
        ))
    }

    async fn publish(&self, subject: &str, headers: Headers, payload: Bytes) -> BusResult<()> {
        let result = if headers.is_empty() {
            self.client.publish(subject.to_owned(), payload).await
        } else {
            self.client
                .publish_with_headers(subject.to_owned(), to_header_map(&headers), payload)
                .await
        };
        result.map_err(|e| BusError::Publish {
            subject: subject.to_owned(),
            reason: e.to_string(),
        })
    }

    async fn request(
        &self,
        subject: &str,
        headers: Headers,
        payload: Bytes,
        timeout: Duration,
    ) -> BusResult<Message> {
        let request = async_nats::Request::new()
            .headers(to_header_map(&headers))
            .payload(payload)
            .timeout(Some(timeout));

        match self.client.send_request(subject.to_owned(), request).await {
            Ok(reply) => Ok(from_nats(&reply)),
            Err(e) => Err(match e.kind() {
                RequestErrorKind::TimedOut => BusError::Timeout(subject.to_owned()),
                RequestErrorKind::NoResponders => BusError::NoResponders(subject.to_owned()),
                _ => BusError::Request {
                    subject: subject.to_owned(),
                    reason: e.to_string(),
                },
            }),
        }
    }

    async fn ensure_stream(&self, spec: &StreamSpec) -> BusResult<()> {
        let config = js_stream::Config {
            name: spec.stream.clone(),
            subjects: spec.subjects.clone(),
            retention: RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_or_create_stream(config.clone())
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        // Apply config changes made since the stream was first created.
        if let Err(e) = self.jetstream.update_stream(&config).await {
            warn!(stream = %spec.stream, error = %e, "stream update rejected, keeping existing config");
        }

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &spec.consumer,
                pull::Config {
                    durable_name: Some(spec.consumer.clone()),
                    ack_policy: AckPolicy::Explicit,
                    max_deliver: i64::from(spec.max_deliver),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;

        info!(
            stream = %spec.stream,
            consumer = %spec.consumer,
            subjects = spec.subjects.len(),
            "work queue ready"
        );
        *self.consumer.write().await = Some(consumer);
        Ok(())
    }

    async fn submit_task(&self, subject: &str, headers: Headers, payload: Bytes) -> BusResult<()> {
        let publish_err = |e: String| BusError::Publish {
            subject: subject.to_owned(),
            reason: e,
        };
        let ack = self
            .jetstream
            .publish_with_headers(subject.to_owned(), to_header_map(&headers), payload)
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        ack.await.map_err(|e| publish_err(e.to_string()))?;
        Ok(())
    }

    async fn fetch_task(&self, max_wait: Duration) -> Result<Delivery, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::Closed);
        }
        let Some(consumer) = self.consumer.read().await.clone() else {
            return Err(FetchError::Other("work queue not initialized".to_owned()));
        };

        let mut batch = consumer
            .fetch()
            .max_messages(1)
            .expires(max_wait)
            .messages()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;

        match batch.next().await {
            None => Err(FetchError::Timeout),
            Some(Err(e)) => Err(FetchError::Other(e.to_string())),
            Some(Ok(task)) => {
                let delivered = task
                    .info()
                    .map(|info| u64::try_from(info.delivered).unwrap_or(1))
                    .unwrap_or(1);
                let message = from_nats(&task.message);
                Ok(Delivery::new(
                    message,
                    delivered,
                    Box::new(NatsSettler { task }),
                ))
            },
        }
    }

    async fn close(&self) -> BusResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.client.flush().await.map_err(|e| {
            error!(error = %e, "flush on close failed");
            BusError::Closed
        })
    }
}

struct NatsSettler {
    task: jetstream::Message,
}

#[async_trait]
impl Settle for NatsSettler {
    async fn settle(self: Box<Self>, disposition: Disposition) -> BusResult<()> {
        let result = match disposition {
            Disposition::Ack => self.task.ack().await,
            Disposition::Nak => self.task.ack_with(AckKind::Nak(None)).await,
            Disposition::Term => self.task.ack_with(AckKind::Term).await,
        };
        result.map_err(|e| BusError::Settle(e.to_string()))
    }
}
