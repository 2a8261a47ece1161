use morph_api::error::ConvertError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// Conversion errors already carry their key path, so only the
    /// message-based variants are prefixed.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::Input(msg) => EngineError::Input(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message_variants() {
        let err = EngineError::Config("bad value".into()).with_context("morph.toml");
        assert_eq!(err.to_string(), "config error: morph.toml: bad value");

        let err = EngineError::from(ConvertError::invalid_value("nope")).with_context("ignored");
        assert!(matches!(err, EngineError::Convert(_)));
    }
}
