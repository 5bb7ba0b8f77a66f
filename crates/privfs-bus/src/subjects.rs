//! Subject naming.
//!
//! Operations live on `<root>.fs.<verb>`; job events on
//! `<events_root>.job.<jobId>`.

use privfs_core::{Transport, Verb};

/// Subject layout for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    root: String,
    events_root: String,
}

impl Subjects {
    /// Layout rooted at `root` with events under `events_root`.
    pub fn new(root: impl Into<String>, events_root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            events_root: events_root.into(),
        }
    }

    /// Operation root.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Subject for one verb.
    #[must_use]
    pub fn verb(&self, verb: Verb) -> String {
        format!("{}.fs.{}", self.root, verb.as_str())
    }

    /// Subjects of every verb on one transport.
    #[must_use]
    pub fn for_transport(&self, transport: Transport) -> Vec<String> {
        Verb::ALL
            .iter()
            .filter(|v| v.transport() == transport)
            .map(|v| self.verb(*v))
            .collect()
    }

    /// Subject for events of one job.
    #[must_use]
    pub fn job_event(&self, job_id: &str) -> String {
        format!("{}.job.{job_id}", self.events_root)
    }

    /// Pattern matching every job event.
    #[must_use]
    pub fn all_job_events(&self) -> String {
        format!("{}.job.*", self.events_root)
    }

    /// Verb addressed by `subject`, if it is one of ours.
    #[must_use]
    pub fn verb_of(&self, subject: &str) -> Option<Verb> {
        subject
            .strip_prefix(self.root.as_str())?
            .strip_prefix(".fs.")?
            .parse()
            .ok()
    }
}

/// NATS-style subject matching.
///
/// Tokens are separated by `.`; `*` matches exactly one token and a trailing
/// `>` matches one or more.
#[must_use]
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {},
            (Some(p), Some(s)) if p == s => {},
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects() -> Subjects {
        Subjects::new("privfs.root", "privfs.events")
    }

    #[test]
    fn verb_subjects() {
        let s = subjects();
        assert_eq!(s.verb(Verb::Mkdir), "privfs.root.fs.mkdir");
        assert_eq!(s.verb(Verb::WriteChunk), "privfs.root.fs.write-chunk");
        assert_eq!(s.job_event("j-1"), "privfs.events.job.j-1");
    }

    #[test]
    fn transports_partition_verbs() {
        let s = subjects();
        let sync = s.for_transport(Transport::Sync);
        let tasks = s.for_transport(Transport::Task);
        assert_eq!(sync.len(), 4);
        assert_eq!(tasks.len(), 8);
        assert!(sync.contains(&"privfs.root.fs.read".to_owned()));
        assert!(tasks.contains(&"privfs.root.fs.chown".to_owned()));
    }

    #[test]
    fn verb_of_parses_our_subjects_only() {
        let s = subjects();
        assert_eq!(s.verb_of("privfs.root.fs.copy"), Some(Verb::Copy));
        assert_eq!(s.verb_of("privfs.root.fs.explode"), None);
        assert_eq!(s.verb_of("other.root.fs.copy"), None);
        assert_eq!(s.verb_of("privfs.rootx.fs.copy"), None);
    }

    #[test]
    fn wildcard_matching() {
        assert!(subject_matches("a.b.c", "a.b.c"));
        assert!(subject_matches("a.*.c", "a.b.c"));
        assert!(subject_matches("a.>", "a.b.c"));
        assert!(subject_matches("privfs.events.job.*", "privfs.events.job.42"));
        assert!(!subject_matches("a.*", "a.b.c"));
        assert!(!subject_matches("a.>", "a"));
        assert!(!subject_matches("a.b", "a.b.c"));
        assert!(!subject_matches("a.b.c", "a.b"));
    }
}
