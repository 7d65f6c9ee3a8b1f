//! Driver configuration.
//!
//! Resource limits load from a TOML file and merge over the defaults, so a
//! config file only needs to name the limits it changes.

use clove_runtime::Limits;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Maximum reader nesting depth.
    pub reader_depth: Option<usize>,
    /// Maximum total forms per read unit.
    pub reader_forms: Option<usize>,
    /// Maximum evaluator/VM call depth.
    pub max_call_depth: Option<usize>,
    /// Live objects before the first collection.
    pub gc_threshold: Option<usize>,
    /// Macro expansion fixed-point bound.
    pub macro_depth: Option<usize>,
}

impl ConfigFile {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge over the default limits.
    pub fn into_limits(self) -> Limits {
        let defaults = Limits::default();
        Limits {
            reader_depth: self.reader_depth.unwrap_or(defaults.reader_depth),
            reader_forms: self.reader_forms.unwrap_or(defaults.reader_forms),
            max_call_depth: self.max_call_depth.unwrap_or(defaults.max_call_depth),
            gc_threshold: self.gc_threshold.unwrap_or(defaults.gc_threshold),
            macro_depth: self.macro_depth.unwrap_or(defaults.macro_depth),
        }
    }
}

pub fn load_limits(path: &Path) -> Result<Limits, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read {}: {}", path.display(), e))?;
    Ok(ConfigFile::from_toml(&content)?.into_limits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_merges_defaults() {
        let cfg = ConfigFile::from_toml("reader_depth = 32\n").unwrap();
        let limits = cfg.into_limits();
        assert_eq!(limits.reader_depth, 32);
        assert_eq!(limits.max_call_depth, Limits::default().max_call_depth);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ConfigFile::from_toml("no_such_limit = 1\n").is_err());
    }

    #[test]
    fn test_empty_config_is_defaults() {
        let limits = ConfigFile::from_toml("").unwrap().into_limits();
        assert_eq!(limits.gc_threshold, Limits::default().gc_threshold);
    }
}
