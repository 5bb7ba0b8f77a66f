//! Broker-neutral message and subscription types.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;

/// Message headers. Names are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// No headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-header map.
    #[must_use]
    pub fn with(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers = Self::new();
        headers.insert(name, value);
        headers
    }

    /// Set a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Value of a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An inbound or outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published on.
    pub subject: String,
    /// Reply address for request/reply, if any.
    pub reply: Option<String>,
    /// Headers.
    pub headers: Headers,
    /// Body.
    pub payload: Bytes,
}

impl Message {
    /// Message without a reply address.
    #[must_use]
    pub fn new(subject: impl Into<String>, headers: Headers, payload: Bytes) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            headers,
            payload,
        }
    }
}

/// Stream of messages from a subscription.
pub struct Subscription {
    subject: String,
    inner: BoxStream<'static, Message>,
}

impl Subscription {
    /// Wrap any message stream.
    pub fn new(subject: impl Into<String>, inner: BoxStream<'static, Message>) -> Self {
        Self {
            subject: subject.into(),
            inner,
        }
    }

    /// Subject or pattern this subscription listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next message, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Message> {
        self.inner.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
