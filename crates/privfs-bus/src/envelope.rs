//! Reply and event bodies.

use privfs_core::{FsError, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header carrying JSON chunk metadata on `write-chunk` requests.
pub const HEADER_META: &str = "X-Meta";

/// Header set to [`STATUS_ERROR`] on a binary-operation reply whose body is a
/// JSON error instead of raw bytes.
pub const HEADER_STATUS: &str = "X-Status";

/// Value of [`HEADER_STATUS`] for failures.
pub const STATUS_ERROR: &str = "error";

/// JSON reply to a synchronous request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReply {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Operation result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wire error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl SyncReply {
    /// Successful reply.
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
            code: None,
        }
    }

    /// Reply for a failed operation.
    #[must_use]
    pub fn failure(err: &FsError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_owned()),
        }
    }

    /// Reply for a request that could not be decoded or routed.
    #[must_use]
    pub fn rejected(err: &ProtocolError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(err.to_string()),
            code: Some("ERR".to_owned()),
        }
    }

    /// Serialize for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| br#"{"ok":false,"error":"encode"}"#.to_vec())
    }

    /// Turn a reply back into the caller-side result.
    ///
    /// # Errors
    ///
    /// The [`FsError`] described by a failed reply.
    pub fn into_result(self) -> Result<Value, FsError> {
        if self.ok {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let message = self.error.unwrap_or_default();
        Err(FsError::from_wire(
            self.code.as_deref().unwrap_or("ERR"),
            &message,
        ))
    }
}

/// Final state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The operation succeeded.
    Completed,
    /// The operation failed (this delivery attempt).
    Failed,
}

/// Event published on `<events_root>.job.<jobId>` after each attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    /// Job id echoed from the request.
    pub job_id: String,
    /// Outcome.
    pub status: JobStatus,
    /// Result payload on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wire error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl JobEvent {
    /// Completion event.
    #[must_use]
    pub fn completed(job_id: impl Into<String>, result: Value) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            result: Some(result),
            error: None,
            code: None,
        }
    }

    /// Failure event.
    #[must_use]
    pub fn failed(job_id: impl Into<String>, err: &FsError) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            result: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_owned()),
        }
    }
}
