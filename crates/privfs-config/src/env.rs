//! Environment variable fallbacks.
//!
//! Environment values never override a file. They fill fields that still
//! hold their built-in default, first matching variable wins.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Variables consulted for each field, in priority order.
const ENV_FALLBACKS: &[(&str, &[&str])] = &[
    ("broker.url", &["PRIVFS_BROKER_URL", "NATS_URL"]),
    ("broker.user", &["PRIVFS_BROKER_USER", "NATS_USER"]),
    ("broker.password", &["PRIVFS_BROKER_PASSWORD", "NATS_PASS"]),
    ("logging.level", &["PRIVFS_LOG_LEVEL"]),
    ("logging.format", &["PRIVFS_LOG_FORMAT"]),
    ("subjects.root", &["PRIVFS_SUBJECT_ROOT"]),
];

/// Apply fallbacks to `merged`, returning how many fields were filled.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut applied: usize = 0;

    for (field, vars) in ENV_FALLBACKS {
        let set_by_file = sources
            .get(*field)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }

        let Some((var, value)) = vars.iter().find_map(|var| {
            env_vars
                .get(*var)
                .filter(|value| !value.is_empty())
                .map(|value| (*var, value))
        }) else {
            continue;
        };

        debug!(var, field, "applying environment fallback");
        set_string(merged, field, value);
        sources.insert((*field).to_owned(), ConfigLayer::Environment);
        applied = applied.saturating_add(1);
    }

    applied
}

/// Snapshot of the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn set_string(root: &mut toml::Value, path: &str, value: &str) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), toml::Value::String(value.to_owned()));
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}
