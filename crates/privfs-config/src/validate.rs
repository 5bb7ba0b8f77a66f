//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LOG_FORMATS: [&str; 4] = ["pretty", "compact", "json", "full"];
const LOG_TARGETS: [&str; 3] = ["stdout", "stderr", "file"];

/// Reject configurations the worker cannot run with.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    non_empty("broker.url", &config.broker.url)?;
    if !config.broker.url.contains("://") {
        return Err(ConfigError::invalid(
            "broker.url",
            format!("\"{}\" has no scheme", config.broker.url),
        ));
    }

    subject_token("subjects.root", &config.subjects.root)?;
    subject_token("subjects.events_root", &config.subjects.events_root)?;
    non_empty("subjects.stream", &config.subjects.stream)?;
    if config.subjects.stream.contains(['.', ' ', '*', '>']) {
        return Err(ConfigError::invalid(
            "subjects.stream",
            "must not contain '.', spaces or wildcards",
        ));
    }
    non_empty("subjects.consumer", &config.subjects.consumer)?;

    if config.queue.max_deliver < 1 {
        return Err(ConfigError::invalid("queue.max_deliver", "must be at least 1"));
    }
    positive("queue.fetch_wait_secs", config.queue.fetch_wait_secs)?;
    positive("timeouts.sync_secs", config.timeouts.sync_secs)?;
    positive("timeouts.binary_secs", config.timeouts.binary_secs)?;
    positive("uploads.stale_after_secs", config.uploads.stale_after_secs)?;
    positive("uploads.sweep_interval_secs", config.uploads.sweep_interval_secs)?;

    let format = config.logging.format.to_ascii_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unknown format \"{}\", expected one of {}",
                config.logging.format,
                LOG_FORMATS.join(", ")
            ),
        ));
    }
    if !LOG_TARGETS.contains(&config.logging.target.as_str()) {
        return Err(ConfigError::invalid(
            "logging.target",
            format!("expected one of {}", LOG_TARGETS.join(", ")),
        ));
    }
    let no_directory = config
        .logging
        .directory
        .as_deref()
        .is_none_or(|dir| dir.trim().is_empty());
    if config.logging.target == "file" && no_directory {
        return Err(ConfigError::invalid(
            "logging.directory",
            "required when logging.target is \"file\"",
        ));
    }

    Ok(())
}

fn non_empty(field: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}

/// A dotted subject prefix with no empty tokens and no wildcards.
fn subject_token(field: &str, value: &str) -> ConfigResult<()> {
    non_empty(field, value)?;
    let bad = value
        .split('.')
        .any(|token| token.is_empty() || token == "*" || token == ">" || token.contains(' '));
    if bad {
        return Err(ConfigError::invalid(
            field,
            format!("\"{value}\" is not a valid subject prefix"),
        ));
    }
    Ok(())
}
