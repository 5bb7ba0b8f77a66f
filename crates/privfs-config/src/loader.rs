//! Layered loading.
//!
//! 1. Parse embedded `defaults.toml`
//! 2. Merge `/etc/privfs/worker.toml` if present
//! 3. Merge the `--config` file if given (must exist)
//! 4. Fill fields still at their default from the environment
//! 5. Deserialize and validate

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate::validate;

/// Embedded default configuration.
pub const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/privfs/worker.toml";

/// Config files larger than this are rejected.
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Load using the real system path and process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable or malformed, if
/// `explicit` does not exist, or if the result fails validation.
pub fn load(explicit: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_layers(
        Some(Path::new(SYSTEM_CONFIG_PATH)),
        explicit,
        &collect_env_vars(),
    )
}

/// Load from explicit layer locations. `system` is optional and skipped when
/// missing; `explicit` must exist when given.
///
/// # Errors
///
/// See [`load`].
pub fn load_layers<S: BuildHasher>(
    system: Option<&Path>,
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value = toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::Parse {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })?;
    let mut sources = FieldSources::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut sources);
    let mut loaded_files = Vec::new();

    if let Some(path) = system
        && let Some(overlay) = read_optional(path)?
    {
        deep_merge(&mut merged, &overlay, "", &ConfigLayer::System, &mut sources);
        info!(path = %path.display(), "loaded system config");
        loaded_files.push(path.to_path_buf());
    }

    if let Some(path) = explicit {
        let overlay = read_required(path)?;
        deep_merge(&mut merged, &overlay, "", &ConfigLayer::Explicit, &mut sources);
        info!(path = %path.display(), "loaded config file");
        loaded_files.push(path.to_path_buf());
    }

    let from_env = apply_env_fallbacks(&mut merged, &mut sources, env_vars);
    if from_env > 0 {
        debug!(count = from_env, "applied environment fallbacks");
    }

    let config: Config = merged.try_into().map_err(|e| ConfigError::Parse {
        path: "<merged config>".to_owned(),
        source: e,
    })?;
    validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources: sources,
        loaded_files,
    })
}

fn read_optional(path: &Path) -> ConfigResult<Option<toml::Value>> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_file(path, &content).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            Ok(None)
        },
        Err(e) => Err(ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

fn read_required(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_file(path, &content)
}

fn parse_file(path: &Path, content: &str) -> ConfigResult<toml::Value> {
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::invalid(
            &path.display().to_string(),
            format!(
                "config file is {} bytes, limit is {MAX_CONFIG_FILE_SIZE}",
                content.len()
            ),
        ));
    }
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Paths consulted by [`load`], for diagnostics.
#[must_use]
pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    paths.extend(explicit.map(Path::to_path_buf));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_struct_defaults() {
        let parsed: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn missing_system_file_is_skipped() {
        let resolved = load_layers(
            Some(Path::new("/nonexistent/privfs/worker.toml")),
            None,
            &HashMap::new(),
        )
        .unwrap();
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(resolved.config, Config::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = load_layers(None, Some(Path::new("/nonexistent/x.toml")), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.toml");
        let body = format!("x = \"{}\"", "a".repeat(MAX_CONFIG_FILE_SIZE));
        std::fs::write(&path, body).unwrap();
        let result = load_layers(None, Some(&path), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn search_paths_lists_system_then_explicit() {
        let paths = search_paths(Some(Path::new("/tmp/w.toml")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from(SYSTEM_CONFIG_PATH),
                PathBuf::from("/tmp/w.toml")
            ]
        );
    }
}
