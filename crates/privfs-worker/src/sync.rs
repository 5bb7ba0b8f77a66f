//! Request/reply handlers for list, stat, read and write-chunk.
//!
//! One loop per subscription; every inbound request gets its own task so a
//! slow read never holds up a stat.

use std::sync::Arc;

use bytes::Bytes;
use privfs_bus::{
    Broker, HEADER_META, HEADER_STATUS, Headers, Message, STATUS_ERROR, Subscription, SyncReply,
    reply,
};
use privfs_core::{Envelope, FsResult, OperationOutput, ProtocolError, Verb};
use privfs_telemetry::RequestContext;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::dispatch::Dispatcher;

/// Answers synchronous requests.
pub(crate) struct SyncHandler {
    broker: Arc<dyn Broker>,
    dispatcher: Arc<Dispatcher>,
}

impl SyncHandler {
    pub(crate) fn new(broker: Arc<dyn Broker>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { broker, dispatcher }
    }

    async fn handle(&self, verb: Verb, request: Message) {
        let envelope = match decode(verb, &request) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(subject = %request.subject, error = %e, "rejecting request");
                let body = SyncReply::rejected(&e).to_bytes();
                self.respond(&request, failure_headers(), Bytes::from(body))
                    .await;
                return;
            },
        };

        let ctx = RequestContext::new("sync")
            .with_operation(verb.as_str())
            .with_account(envelope.account.as_deref());
        async {
            let outcome = self.dispatcher.dispatch(envelope).await;
            match &outcome {
                Ok(_) => debug!(elapsed_ms = ctx.elapsed_ms(), "request served"),
                Err(e) => info!(
                    elapsed_ms = ctx.elapsed_ms(),
                    code = e.code(),
                    error = %e,
                    "request failed"
                ),
            }
            let (headers, body) = reply_for(outcome);
            self.respond(&request, headers, body).await;
        }
        .instrument(ctx.span())
        .await;
    }

    async fn respond(&self, request: &Message, headers: Headers, body: Bytes) {
        if let Err(e) = reply(self.broker.as_ref(), request, headers, body).await {
            warn!(subject = %request.subject, error = %e, "reply not delivered");
        }
    }
}

/// Serve one subscription until cancelled or the subscription ends.
pub(crate) async fn serve(
    mut subscription: Subscription,
    verb: Verb,
    handler: Arc<SyncHandler>,
    cancel: CancellationToken,
) {
    debug!(subject = subscription.subject(), "sync handler started");
    loop {
        let request = tokio::select! {
            () = cancel.cancelled() => break,
            next = subscription.next() => match next {
                Some(request) => request,
                None => {
                    warn!(subject = subscription.subject(), "subscription ended");
                    break;
                },
            },
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { handler.handle(verb, request).await });
    }
    debug!(subject = subscription.subject(), "sync handler stopped");
}

fn decode(verb: Verb, request: &Message) -> Result<Envelope, ProtocolError> {
    match verb {
        Verb::WriteChunk => Envelope::decode_chunk(
            request.headers.get(HEADER_META),
            request.payload.to_vec(),
        ),
        _ => Envelope::decode(verb, &request.payload),
    }
}

fn failure_headers() -> Headers {
    Headers::with(HEADER_STATUS, STATUS_ERROR)
}

/// Reply for an outcome: raw bytes for a successful read, the JSON
/// envelope for everything else. Failures also carry `X-Status: error`.
fn reply_for(outcome: FsResult<OperationOutput>) -> (Headers, Bytes) {
    match outcome {
        Ok(OperationOutput::Bytes(content)) => (Headers::new(), Bytes::from(content)),
        Ok(output) => {
            let result = output.to_json().unwrap_or(Value::Null);
            (Headers::new(), Bytes::from(SyncReply::success(result).to_bytes()))
        },
        Err(e) => (failure_headers(), Bytes::from(SyncReply::failure(&e).to_bytes())),
    }
}
