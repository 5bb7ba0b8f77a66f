//! Operation requests as they travel on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::verb::Verb;

/// Request carrying a single path (list, stat, read, delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRequest {
    /// Absolute target path.
    pub path: String,
}

impl PathRequest {
    /// Request for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Directory creation under a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MkdirRequest {
    /// Absolute parent directory.
    pub parent_path: String,
    /// Requested name; empty means the default name.
    #[serde(default)]
    pub name: String,
}

/// Copy or move of `src` into `dst_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Absolute source path.
    pub src: String,
    /// Absolute destination directory.
    pub dst_dir: String,
}

/// In-place rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    /// Absolute path of the entry to rename.
    pub path: String,
    /// New final component.
    pub new_name: String,
}

/// Chunk concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleRequest {
    /// Absolute destination file.
    pub dest_file: String,
    /// Absolute chunk paths, in concatenation order.
    pub chunks: Vec<String>,
    /// Staging directory removed after a successful assembly.
    #[serde(default)]
    pub staging_dir: String,
}

/// Permission change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChmodRequest {
    /// Absolute target path.
    pub path: String,
    /// Octal permission string, e.g. `"750"`.
    pub mode: String,
}

/// Ownership change. Empty owner or group leaves that id unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChownRequest {
    /// Absolute target path.
    pub path: String,
    /// Account name or numeric uid.
    #[serde(default)]
    pub owner: String,
    /// Group name or numeric gid.
    #[serde(default)]
    pub group: String,
}

/// Metadata for one upload chunk, carried in the `X-Meta` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    /// Caller-chosen upload identifier.
    pub upload_id: String,
    /// Zero-based chunk position.
    pub chunk_index: u32,
    /// Absolute directory the final file will land in.
    pub dest_dir: String,
    /// Account to write as.
    #[serde(default)]
    pub linux_username: String,
}

impl ChunkMeta {
    /// Encode as the header value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if serialization fails.
    pub fn to_header(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// One filesystem operation with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Enumerate a directory.
    List(PathRequest),
    /// Describe one path.
    Stat(PathRequest),
    /// Read file content.
    Read(PathRequest),
    /// Stage one upload chunk.
    WriteChunk {
        /// Chunk addressing.
        meta: ChunkMeta,
        /// Raw chunk bytes.
        data: Vec<u8>,
    },
    /// Create a directory.
    Mkdir(MkdirRequest),
    /// Recursive copy.
    Copy(TransferRequest),
    /// Move into another directory.
    Move(TransferRequest),
    /// Rename in place.
    Rename(RenameRequest),
    /// Recursive removal.
    Delete(PathRequest),
    /// Concatenate chunks.
    Assemble(AssembleRequest),
    /// Change permission bits.
    Chmod(ChmodRequest),
    /// Change ownership.
    Chown(ChownRequest),
}

impl Operation {
    /// Kind of this operation.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        match self {
            Self::List(_) => Verb::List,
            Self::Stat(_) => Verb::Stat,
            Self::Read(_) => Verb::Read,
            Self::WriteChunk { .. } => Verb::WriteChunk,
            Self::Mkdir(_) => Verb::Mkdir,
            Self::Copy(_) => Verb::Copy,
            Self::Move(_) => Verb::Move,
            Self::Rename(_) => Verb::Rename,
            Self::Delete(_) => Verb::Delete,
            Self::Assemble(_) => Verb::Assemble,
            Self::Chmod(_) => Verb::Chmod,
            Self::Chown(_) => Verb::Chown,
        }
    }

    /// Every path argument that must pass validation before execution.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::List(r) | Self::Stat(r) | Self::Read(r) | Self::Delete(r) => {
                vec![r.path.as_str()]
            },
            Self::WriteChunk { meta, .. } => vec![meta.dest_dir.as_str()],
            Self::Mkdir(r) => vec![r.parent_path.as_str()],
            Self::Copy(r) | Self::Move(r) => vec![r.src.as_str(), r.dst_dir.as_str()],
            Self::Rename(r) => vec![r.path.as_str()],
            Self::Assemble(r) => {
                let mut paths = Vec::with_capacity(r.chunks.len().saturating_add(2));
                paths.push(r.dest_file.as_str());
                paths.extend(r.chunks.iter().map(String::as_str));
                if !r.staging_dir.is_empty() {
                    paths.push(r.staging_dir.as_str());
                }
                paths
            },
            Self::Chmod(r) => vec![r.path.as_str()],
            Self::Chown(r) => vec![r.path.as_str()],
        }
    }
}

/// Fields common to every JSON request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    linux_username: String,
}

/// Outbound JSON body: common fields plus the operation payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Outbound<'a, T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    linux_username: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

/// A decoded request: the operation, the account to run it as, and the job
/// it belongs to (task path only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Job identifier echoed on completion events.
    pub job_id: Option<String>,
    /// Account to impersonate; `None` runs as the service identity.
    pub account: Option<String>,
    /// The operation itself.
    pub operation: Operation,
}

impl Envelope {
    /// Build an envelope, normalizing an empty account to `None` and
    /// dropping the account for verbs that never impersonate.
    #[must_use]
    pub fn new(job_id: Option<String>, account: Option<String>, operation: Operation) -> Self {
        let account = if operation.verb().impersonates() {
            account.filter(|a| !a.is_empty())
        } else {
            None
        };
        Self {
            job_id: job_id.filter(|j| !j.is_empty()),
            account,
            operation,
        }
    }

    /// Decode a JSON request body for `verb`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the body is not valid JSON for
    /// the verb, or if `verb` is binary and has no JSON form.
    pub fn decode(verb: Verb, body: &[u8]) -> Result<Self, ProtocolError> {
        let header: Header = parse(body)?;
        let operation = match verb {
            Verb::List => Operation::List(parse(body)?),
            Verb::Stat => Operation::Stat(parse(body)?),
            Verb::Read => Operation::Read(parse(body)?),
            Verb::WriteChunk => {
                return Err(ProtocolError::Malformed(
                    "write-chunk carries metadata in a header, not a JSON body".into(),
                ));
            },
            Verb::Mkdir => Operation::Mkdir(parse(body)?),
            Verb::Copy => Operation::Copy(parse(body)?),
            Verb::Move => Operation::Move(parse(body)?),
            Verb::Rename => Operation::Rename(parse(body)?),
            Verb::Delete => Operation::Delete(parse(body)?),
            Verb::Assemble => Operation::Assemble(parse(body)?),
            Verb::Chmod => Operation::Chmod(parse(body)?),
            Verb::Chown => Operation::Chown(parse(body)?),
        };
        Ok(Self::new(
            header.job_id,
            Some(header.linux_username),
            operation,
        ))
    }

    /// Decode a binary chunk write from its metadata header and body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the header is missing or is
    /// not valid chunk metadata.
    pub fn decode_chunk(meta_header: Option<&str>, data: Vec<u8>) -> Result<Self, ProtocolError> {
        let raw = meta_header
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProtocolError::Malformed("missing X-Meta header".into()))?;
        let meta: ChunkMeta = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::Malformed(format!("bad X-Meta: {e}")))?;
        let account = Some(meta.linux_username.clone());
        Ok(Self::new(None, account, Operation::WriteChunk { meta, data }))
    }

    /// Encode the JSON request body for this envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for chunk writes, which travel as
    /// raw bytes plus a header, or if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let job_id = self.job_id.as_deref();
        let linux_username = self.account.as_deref().unwrap_or("");
        match &self.operation {
            Operation::List(r) | Operation::Stat(r) | Operation::Read(r) | Operation::Delete(r) => {
                to_body(job_id, linux_username, r)
            },
            Operation::WriteChunk { .. } => Err(ProtocolError::Malformed(
                "write-chunk has no JSON body".into(),
            )),
            Operation::Mkdir(r) => to_body(job_id, linux_username, r),
            Operation::Copy(r) | Operation::Move(r) => to_body(job_id, linux_username, r),
            Operation::Rename(r) => to_body(job_id, linux_username, r),
            Operation::Assemble(r) => to_body(job_id, linux_username, r),
            Operation::Chmod(r) => to_body(job_id, "", r),
            Operation::Chown(r) => to_body(job_id, "", r),
        }
    }
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(body).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn to_body<T: Serialize>(
    job_id: Option<&str>,
    linux_username: &str,
    body: &T,
) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&Outbound {
        job_id,
        linux_username,
        body,
    })
    .map_err(|e| ProtocolError::Malformed(e.to_string()))
}
