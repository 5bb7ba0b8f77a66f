//! One operation run locally through the dispatch table, no broker involved.
//!
//! Exit statuses: 0 success, 13 `EACCES`, 2 `ENOENT`, 17 `EEXIST`, 1 for
//! anything else including malformed input.

use privfs_bus::SyncReply;
use privfs_core::{Envelope, OperationOutput, ProtocolError, Verb};
use serde_json::Value;

use crate::dispatch::Dispatcher;

/// What `exec` prints and how it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Raw file bytes for a successful read, otherwise a JSON reply line.
    pub stdout: Vec<u8>,
    /// Process exit status.
    pub status: i32,
}

impl ExecOutcome {
    fn json(reply: &SyncReply, status: i32) -> Self {
        let mut stdout = reply.to_bytes();
        stdout.push(b'\n');
        Self { stdout, status }
    }
}

/// Run `verb` with its JSON `request`.
///
/// For `write-chunk`, `request` is the chunk metadata and `data` the chunk
/// bytes; every other verb ignores `data`.
pub async fn exec_local(
    dispatcher: &Dispatcher,
    verb: &str,
    request: &str,
    data: Vec<u8>,
) -> ExecOutcome {
    let envelope = match decode(verb, request, data) {
        Ok(envelope) => envelope,
        Err(e) => return ExecOutcome::json(&SyncReply::rejected(&e), 1),
    };

    match dispatcher.dispatch(envelope).await {
        Ok(OperationOutput::Bytes(content)) => ExecOutcome {
            stdout: content,
            status: 0,
        },
        Ok(output) => {
            let result = output.to_json().unwrap_or(Value::Null);
            ExecOutcome::json(&SyncReply::success(result), 0)
        },
        Err(e) => ExecOutcome::json(&SyncReply::failure(&e), e.exit_status()),
    }
}

fn decode(verb: &str, request: &str, data: Vec<u8>) -> Result<Envelope, ProtocolError> {
    match verb.parse::<Verb>()? {
        Verb::WriteChunk => Envelope::decode_chunk(Some(request), data),
        verb => Envelope::decode(verb, request.as_bytes()),
    }
}
