//! Caller-side facade over the two transports.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use privfs_core::{
    ChunkMeta, Envelope, FsError, ListEntry, Operation, PathRequest, ProtocolError, StatRecord,
    Transport, Verb,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::broker::Broker;
use crate::envelope::{HEADER_META, HEADER_STATUS, STATUS_ERROR, SyncReply};
use crate::error::BusError;
use crate::message::{Headers, Message};
use crate::subjects::Subjects;

/// Reply deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// JSON request/reply operations.
    pub sync: Duration,
    /// Binary operations (read, write-chunk).
    pub binary: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            sync: Duration::from_secs(10),
            binary: Duration::from_secs(30),
        }
    }
}

/// Failures seen by a caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The worker ran the operation and it failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The request or reply could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type for client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Issues filesystem operations to a worker over a [`Broker`].
#[derive(Clone)]
pub struct FsClient {
    broker: Arc<dyn Broker>,
    subjects: Subjects,
    timeouts: Timeouts,
}

impl FsClient {
    /// Client with the default timeouts.
    pub fn new(broker: Arc<dyn Broker>, subjects: Subjects) -> Self {
        Self::with_timeouts(broker, subjects, Timeouts::default())
    }

    /// Client with explicit timeouts.
    pub fn with_timeouts(broker: Arc<dyn Broker>, subjects: Subjects, timeouts: Timeouts) -> Self {
        Self {
            broker,
            subjects,
            timeouts,
        }
    }

    /// List a directory as `account`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`].
    pub async fn list(&self, account: &str, path: &str) -> ClientResult<Vec<ListEntry>> {
        self.call_json(account, Operation::List(PathRequest::new(path)))
            .await
    }

    /// Stat a path as `account`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`].
    pub async fn stat(&self, account: &str, path: &str) -> ClientResult<StatRecord> {
        self.call_json(account, Operation::Stat(PathRequest::new(path)))
            .await
    }

    /// Read a file as `account`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`].
    pub async fn read(&self, account: &str, path: &str) -> ClientResult<Vec<u8>> {
        let envelope = Envelope::new(
            None,
            Some(account.to_owned()),
            Operation::Read(PathRequest::new(path)),
        );
        let reply = self
            .broker
            .request(
                &self.subjects.verb(Verb::Read),
                Headers::new(),
                Bytes::from(envelope.encode()?),
                self.timeouts.binary,
            )
            .await?;

        if reply.headers.get(HEADER_STATUS) == Some(STATUS_ERROR) {
            return Err(decode_failure(&reply));
        }
        Ok(reply.payload.to_vec())
    }

    /// Stage one upload chunk as `meta.linux_username`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`].
    pub async fn write_chunk(&self, meta: &ChunkMeta, data: Bytes) -> ClientResult<()> {
        let headers = Headers::with(HEADER_META, meta.to_header()?);
        let reply = self
            .broker
            .request(
                &self.subjects.verb(Verb::WriteChunk),
                headers,
                data,
                self.timeouts.binary,
            )
            .await?;
        decode_reply(&reply)?;
        Ok(())
    }

    /// Queue a mutating operation as a job. The outcome arrives later as an
    /// event on the job's subject.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Unsupported`] for verbs not served by the queue,
    /// otherwise encoding or transport failures.
    pub async fn submit(
        &self,
        job_id: &str,
        account: &str,
        operation: Operation,
    ) -> ClientResult<()> {
        let verb = operation.verb();
        if verb.transport() != Transport::Task {
            return Err(ProtocolError::Unsupported(format!("{verb} is not a queued operation")).into());
        }
        let envelope = Envelope::new(
            Some(job_id.to_owned()),
            Some(account.to_owned()),
            operation,
        );
        self.broker
            .submit_task(
                &self.subjects.verb(verb),
                Headers::new(),
                Bytes::from(envelope.encode()?),
            )
            .await?;
        Ok(())
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        account: &str,
        operation: Operation,
    ) -> ClientResult<T> {
        let verb = operation.verb();
        let envelope = Envelope::new(None, Some(account.to_owned()), operation);
        let reply = self
            .broker
            .request(
                &self.subjects.verb(verb),
                Headers::new(),
                Bytes::from(envelope.encode()?),
                self.timeouts.sync,
            )
            .await?;

        let value = decode_reply(&reply)?;
        serde_json::from_value(value)
            .map_err(|e| ProtocolError::Malformed(format!("{verb} result: {e}")).into())
    }
}

fn decode_reply(reply: &Message) -> ClientResult<serde_json::Value> {
    let parsed: SyncReply = serde_json::from_slice(&reply.payload)
        .map_err(|e| ProtocolError::Malformed(format!("reply: {e}")))?;
    Ok(parsed.into_result()?)
}

fn decode_failure(reply: &Message) -> ClientError {
    match decode_reply(reply) {
        Err(e) => e,
        Ok(_) => ProtocolError::Malformed("error status on a successful reply".to_owned()).into(),
    }
}
