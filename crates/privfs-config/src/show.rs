//! Resolved configuration with source annotations, for `check-config`.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::FieldSources;
use crate::types::Config;

const MASK: &str = "***";

/// A loaded configuration and where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Final merged configuration.
    pub config: Config,
    /// Dotted field path to the layer that set it.
    pub field_sources: FieldSources,
    /// Files merged, lowest precedence first.
    pub loaded_files: Vec<PathBuf>,
}

impl ResolvedConfig {
    /// Render as TOML with a `# [layer]` note on every value. The broker
    /// password is masked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn render_toml(&self) -> ConfigResult<String> {
        let mut masked = self.config.clone();
        masked.broker.password = MASK.to_owned();
        let body =
            toml::to_string_pretty(&masked).map_err(|e| ConfigError::Render(e.to_string()))?;

        let mut out = String::from("# Resolved privfs worker configuration\n");
        if self.loaded_files.is_empty() {
            out.push_str("# No config files found, built-in defaults only\n");
        } else {
            out.push_str("# Loaded files (lowest precedence first):\n");
            for path in &self.loaded_files {
                let _ = writeln!(out, "#   {}", path.display());
            }
        }
        out.push('\n');

        let mut section = String::new();
        for line in body.lines() {
            let trimmed = line.trim();
            if let Some(name) = trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                name.clone_into(&mut section);
                out.push_str(line);
                out.push('\n');
                continue;
            }
            match self.annotation(&section, trimmed) {
                Some(layer) => {
                    let _ = writeln!(out, "{line}  # [{layer}]");
                },
                None => {
                    out.push_str(line);
                    out.push('\n');
                },
            }
        }
        Ok(out)
    }

    fn annotation(&self, section: &str, line: &str) -> Option<String> {
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let key = line.split('=').next()?.trim();
        let path = if section.is_empty() {
            key.to_owned()
        } else {
            format!("{section}.{key}")
        };
        self.field_sources.get(&path).map(ToString::to_string)
    }
}
