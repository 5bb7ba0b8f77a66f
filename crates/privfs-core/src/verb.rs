//! The closed set of operation kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Which messaging pattern carries an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Request/reply: the caller blocks for one reply.
    Sync,
    /// Durable work queue with explicit acknowledgement.
    Task,
}

/// Operation kind.
///
/// The subject suffix of every inbound message parses into exactly one
/// variant; anything else is [`ProtocolError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    /// Enumerate a directory.
    List,
    /// Describe one path without following symlinks.
    Stat,
    /// Read file content, capped.
    Read,
    /// Stage one upload chunk.
    WriteChunk,
    /// Create a directory with collision-avoiding naming.
    Mkdir,
    /// Recursive copy to a unique name.
    Copy,
    /// Move into another directory.
    Move,
    /// Rename within the same parent.
    Rename,
    /// Recursive removal.
    Delete,
    /// Concatenate staged chunks into a file.
    Assemble,
    /// Change permission bits as the service identity.
    Chmod,
    /// Change ownership as the service identity.
    Chown,
}

impl Verb {
    /// Every verb, sync verbs first.
    pub const ALL: [Self; 12] = [
        Self::List,
        Self::Stat,
        Self::Read,
        Self::WriteChunk,
        Self::Mkdir,
        Self::Copy,
        Self::Move,
        Self::Rename,
        Self::Delete,
        Self::Assemble,
        Self::Chmod,
        Self::Chown,
    ];

    /// Subject suffix for this verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Stat => "stat",
            Self::Read => "read",
            Self::WriteChunk => "write-chunk",
            Self::Mkdir => "mkdir",
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Rename => "rename",
            Self::Delete => "delete",
            Self::Assemble => "assemble",
            Self::Chmod => "chmod",
            Self::Chown => "chown",
        }
    }

    /// Messaging pattern used for this verb.
    #[must_use]
    pub const fn transport(self) -> Transport {
        match self {
            Self::List | Self::Stat | Self::Read | Self::WriteChunk => Transport::Sync,
            Self::Mkdir
            | Self::Copy
            | Self::Move
            | Self::Rename
            | Self::Delete
            | Self::Assemble
            | Self::Chmod
            | Self::Chown => Transport::Task,
        }
    }

    /// Whether the operation runs as the requesting account.
    ///
    /// `chmod` and `chown` always run as the service identity.
    #[must_use]
    pub const fn impersonates(self) -> bool {
        !matches!(self, Self::Chmod | Self::Chown)
    }

    /// Whether the request and reply bodies are raw bytes rather than JSON.
    #[must_use]
    pub const fn is_binary(self) -> bool {
        matches!(self, Self::Read | Self::WriteChunk)
    }

    /// Verbs served over request/reply.
    pub fn sync_verbs() -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(|v| v.transport() == Transport::Sync)
    }

    /// Verbs carried by the durable work queue.
    pub fn task_verbs() -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(|v| v.transport() == Transport::Task)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ProtocolError::Unsupported(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_verb() {
        for verb in Verb::ALL {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
    }

    #[test]
    fn unknown_verb_is_unsupported() {
        let err = "truncate".parse::<Verb>().unwrap_err();
        assert_eq!(err, ProtocolError::Unsupported("truncate".to_string()));
    }

    #[test]
    fn transport_split() {
        let sync: Vec<_> = Verb::sync_verbs().collect();
        assert_eq!(
            sync,
            vec![Verb::List, Verb::Stat, Verb::Read, Verb::WriteChunk]
        );
        assert_eq!(Verb::task_verbs().count(), 8);
    }

    #[test]
    fn only_chmod_and_chown_skip_impersonation() {
        let skipped: Vec<_> = Verb::ALL
            .into_iter()
            .filter(|v| !v.impersonates())
            .collect();
        assert_eq!(skipped, vec![Verb::Chmod, Verb::Chown]);
    }
}
