use thiserror::Error;

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Could not connect to the broker.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// Subscribing to a subject failed.
    #[error("subscribe to {subject} failed: {reason}")]
    Subscribe {
        /// Subject or pattern.
        subject: String,
        /// Underlying failure.
        reason: String,
    },

    /// Publishing failed.
    #[error("publish to {subject} failed: {reason}")]
    Publish {
        /// Target subject.
        subject: String,
        /// Underlying failure.
        reason: String,
    },

    /// No reply arrived in time.
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Nobody is listening on the subject.
    #[error("no responders on {0}")]
    NoResponders(String),

    /// Any other request failure.
    #[error("request to {subject} failed: {reason}")]
    Request {
        /// Target subject.
        subject: String,
        /// Underlying failure.
        reason: String,
    },

    /// Stream or consumer setup failed.
    #[error("stream setup failed: {0}")]
    Stream(String),

    /// A task was submitted before any stream covers its subject.
    #[error("no stream accepts subject {0}")]
    NoStream(String),

    /// Ack/nak/term could not be delivered to the broker.
    #[error("settling message failed: {0}")]
    Settle(String),

    /// The broker has been closed.
    #[error("broker closed")]
    Closed,
}

/// Result type for transport operations.
pub type BusResult<T> = Result<T, BusError>;

/// Outcome of a failed queue fetch. The pull loop reacts to each differently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Nothing arrived within the wait; fetch again.
    #[error("fetch timed out")]
    Timeout,

    /// The connection is gone for good; stop pulling.
    #[error("connection closed")]
    Closed,

    /// Anything else; back off and retry.
    #[error("fetch failed: {0}")]
    Other(String),
}
