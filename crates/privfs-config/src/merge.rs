//! Layer merging with per-field source tracking.

use std::collections::BTreeMap;
use std::fmt;

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `/etc/privfs/worker.toml`.
    System,
    /// The file given with `--config`.
    Explicit,
    /// Environment variable fallback.
    Environment,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Defaults => "defaults",
            Self::System => "system",
            Self::Explicit => "file",
            Self::Environment => "env",
        })
    }
}

/// Dotted field path to the layer that last set it.
pub type FieldSources = BTreeMap<String, ConfigLayer>;

/// Merge `overlay` into `base`. Tables merge per key; scalars and arrays
/// replace. Every leaf written is recorded in `sources` under `layer`.
pub fn deep_merge(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                let nested = base_table
                    .get_mut(key)
                    .filter(|base_val| base_val.is_table() && overlay_val.is_table());
                if let Some(base_val) = nested {
                    deep_merge(base_val, overlay_val, &path, layer, sources);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            record_leaves(overlay, prefix, layer, sources);
        },
    }
}

/// Record every leaf under `val` as set by `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn overlay_replaces_only_named_leaves() {
        let mut base = parse("[broker]\nurl = \"a\"\nuser = \"u\"\n");
        let mut sources = FieldSources::new();
        record_leaves(&base, "", &ConfigLayer::Defaults, &mut sources);

        deep_merge(
            &mut base,
            &parse("[broker]\nurl = \"b\"\n"),
            "",
            &ConfigLayer::System,
            &mut sources,
        );

        assert_eq!(base["broker"]["url"].as_str(), Some("b"));
        assert_eq!(base["broker"]["user"].as_str(), Some("u"));
        assert_eq!(sources["broker.url"], ConfigLayer::System);
        assert_eq!(sources["broker.user"], ConfigLayer::Defaults);
    }

    #[test]
    fn arrays_replace_rather_than_append() {
        let mut base = parse("[logging]\ndirectives = [\"a=debug\"]\n");
        let mut sources = FieldSources::new();
        deep_merge(
            &mut base,
            &parse("[logging]\ndirectives = [\"b=trace\"]\n"),
            "",
            &ConfigLayer::Explicit,
            &mut sources,
        );
        let directives = base["logging"]["directives"].as_array().unwrap();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].as_str(), Some("b=trace"));
        assert_eq!(sources["logging.directives"], ConfigLayer::Explicit);
    }

    #[test]
    fn new_sections_are_recorded() {
        let mut base = parse("[broker]\nurl = \"a\"\n");
        let mut sources = FieldSources::new();
        deep_merge(
            &mut base,
            &parse("[uploads]\nstale_after_secs = 60\n"),
            "",
            &ConfigLayer::Explicit,
            &mut sources,
        );
        assert_eq!(base["uploads"]["stale_after_secs"].as_integer(), Some(60));
        assert_eq!(sources["uploads.stale_after_secs"], ConfigLayer::Explicit);
    }
}
