//! Per-message tracing context.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Correlation data for one inbound message.
///
/// Every message the worker handles gets a fresh request id; task messages
/// also carry the caller's job id so log lines can be joined with the job
/// ledger.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique per message.
    pub request_id: Uuid,
    /// Handler that owns the message (`sync`, `tasks`, `exec`).
    pub component: &'static str,
    /// Verb being executed.
    pub operation: Option<String>,
    /// Caller-supplied job id.
    pub job_id: Option<String>,
    /// Account the operation runs as.
    pub account: Option<String>,
    /// When handling started.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// Fresh context for `component`.
    #[must_use]
    pub fn new(component: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            component,
            operation: None,
            job_id: None,
            account: None,
            started_at: Utc::now(),
        }
    }

    /// Set the verb.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set the job id, if any.
    #[must_use]
    pub fn with_job_id(mut self, job_id: Option<&str>) -> Self {
        self.job_id = job_id.map(str::to_owned);
        self
    }

    /// Set the account, if any.
    #[must_use]
    pub fn with_account(mut self, account: Option<&str>) -> Self {
        self.account = account.map(str::to_owned);
        self
    }

    /// Milliseconds since the context was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Span carrying every field.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "message",
            request_id = %self.request_id,
            component = self.component,
            verb = self.operation.as_deref(),
            job_id = self.job_id.as_deref(),
            account = self.account.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_context_gets_its_own_id() {
        let a = RequestContext::new("tasks");
        let b = RequestContext::new("tasks");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn builder_sets_fields() {
        let ctx = RequestContext::new("sync")
            .with_operation("list")
            .with_job_id(Some("job-7"))
            .with_account(None);
        assert_eq!(ctx.component, "sync");
        assert_eq!(ctx.operation.as_deref(), Some("list"));
        assert_eq!(ctx.job_id.as_deref(), Some("job-7"));
        assert!(ctx.account.is_none());
        assert!(ctx.elapsed_ms() >= 0);
    }
}
