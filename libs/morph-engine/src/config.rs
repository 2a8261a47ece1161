use serde::Deserialize;

use crate::error::EngineError;

/// Engine configuration, parsed from TOML. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Deepest cast nesting allowed before a conversion is aborted.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Install the built-in casts into a fresh registry.
    #[serde(default = "default_true")]
    pub builtins: bool,

    /// Root value of the `strict_schemas` setting.
    #[serde(default)]
    pub strict_schemas: bool,

    /// Root value of the `logs` setting.
    #[serde(default = "default_true")]
    pub logs: bool,

    /// Containers with at least this many items are converted in parallel
    /// when the `parallel` feature is enabled.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

fn default_max_depth() -> usize {
    512
}

fn default_true() -> bool {
    true
}

fn default_parallel_threshold() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            builtins: true,
            strict_schemas: false,
            logs: true,
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(EngineConfig::parse("").expect("parse"), EngineConfig::default());
    }

    #[test]
    fn explicit_values_win() {
        let config = EngineConfig::parse(
            r#"
            max_depth = 8
            strict_schemas = true
            logs = false
            "#,
        )
        .expect("parse");
        assert_eq!(config.max_depth, 8);
        assert!(config.strict_schemas);
        assert!(!config.logs);
        assert!(config.builtins);
        assert_eq!(config.parallel_threshold, 64);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::parse("max_dept = 3").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = EngineConfig::load("/nonexistent/morph.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/morph.toml"));
    }
}
