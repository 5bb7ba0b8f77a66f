//! Success payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a filesystem entry as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Anything that is not a directory.
    File,
    /// A directory.
    Dir,
}

/// One directory entry from `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Final path component.
    pub name: String,
    /// Absolute path.
    pub path: String,
    /// File or directory.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes, files only.
    pub size: Option<u64>,
    /// Modification time, ISO-8601 UTC with millisecond precision.
    pub mtime: String,
}

/// Result of `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Permission bits as three octal digits.
    pub mode: String,
    /// Owner name, or the numeric uid if it has no name.
    pub owner: String,
    /// Group name, or the numeric gid if it has no name.
    pub group: String,
    /// Numeric owner.
    pub uid: u32,
    /// Numeric group.
    pub gid: u32,
    /// File or directory.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes, files only.
    pub size: Option<u64>,
}

/// Result of `mkdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDir {
    /// Absolute path actually created.
    pub path: String,
    /// Final component actually used.
    pub name: String,
}

/// Result of `copy`, `move` and `rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocated {
    /// Always `true`.
    pub ok: bool,
    /// Absolute destination path.
    pub dst: String,
}

impl Relocated {
    /// Successful relocation to `dst`.
    #[must_use]
    pub fn to(dst: impl Into<String>) -> Self {
        Self {
            ok: true,
            dst: dst.into(),
        }
    }
}

/// Typed success payload of any operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// Directory listing.
    Entries(Vec<ListEntry>),
    /// Stat record.
    Stat(StatRecord),
    /// Raw file content.
    Bytes(Vec<u8>),
    /// Newly created directory.
    Created(CreatedDir),
    /// Destination of a copy, move or rename.
    Relocated(Relocated),
    /// Completed without a payload.
    Done,
}

impl OperationOutput {
    /// JSON form used in replies and completion events.
    ///
    /// Raw bytes have no JSON form and yield `None`.
    #[must_use]
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Entries(entries) => serde_json::to_value(entries).ok(),
            Self::Stat(stat) => serde_json::to_value(stat).ok(),
            Self::Bytes(_) => None,
            Self::Created(created) => serde_json::to_value(created).ok(),
            Self::Relocated(relocated) => serde_json::to_value(relocated).ok(),
            Self::Done => Some(serde_json::json!({ "ok": true })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_entry_serializes_type_and_null_size() {
        let entry = ListEntry {
            name: "docs".into(),
            path: "/srv/docs".into(),
            kind: EntryKind::Dir,
            size: None,
            mtime: "2024-01-15T10:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "dir");
        assert!(json["size"].is_null());
    }

    #[test]
    fn done_is_ok_true() {
        assert_eq!(
            OperationOutput::Done.to_json(),
            Some(serde_json::json!({ "ok": true }))
        );
    }

    #[test]
    fn bytes_have_no_json_form() {
        assert_eq!(OperationOutput::Bytes(vec![1]).to_json(), None);
    }

    #[test]
    fn relocated_shape() {
        let json = OperationOutput::Relocated(Relocated::to("/srv/b.txt"))
            .to_json()
            .unwrap();
        assert_eq!(json, serde_json::json!({ "ok": true, "dst": "/srv/b.txt" }));
    }
}
