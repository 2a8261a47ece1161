use std::fmt;

use crate::metamorphosis::Metamorphosis;
use crate::types::TypeKey;
use crate::value::Key;

/// What went wrong. Every kind is terminal for the conversion in progress.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    /// Malformed schema (the `Final` marker mixed with other keys).
    #[error("schema not valid: {0}")]
    SchemaNotValid(String),

    /// Source and destination schemas are structurally incompatible.
    #[error("schemas don't match at '{key}': {detail}")]
    SchemasDontMatch { key: String, detail: String },

    #[error("no converter found for {0}")]
    NoConverterFound(Metamorphosis),

    /// Several equally specific, mutually incomparable registrations match.
    #[error("ambiguous conversion for {requested}: {}", join(.candidates))]
    AmbiguousConversion {
        requested: Metamorphosis,
        candidates: Vec<Metamorphosis>,
    },

    #[error("setting '{0}' is not declared")]
    UnknownSetting(String),

    #[error("setting '{name}' expects {expected}, got {got}")]
    SettingType {
        name: String,
        expected: String,
        got: String,
    },

    /// A record was reached again while it was still being decomposed.
    #[error("cyclic structure: record of type '{0}' contains itself")]
    CyclicStructure(TypeKey),

    #[error("recursion depth {0} exceeded")]
    DepthExceeded(usize),

    /// Raised by an object-model adapter (missing attribute, bad instance, ...).
    #[error("adapter: {0}")]
    Adapter(String),

    /// A value that a converter cannot handle.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

fn join(items: &[Metamorphosis]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ordered keys from the root value down to the failure point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPath(Vec<Key>);

impl KeyPath {
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for key in &self.0 {
            match key {
                Key::Int(i) => write!(f, "[{i}]")?,
                Key::Str(s) => write!(f, ".{s}")?,
            }
        }
        Ok(())
    }
}

/// Conversion error, returned by every fallible operation of the engine and
/// of object-model adapters.
///
/// Carries the [`ErrorKind`], the key path at which it happened and the
/// metamorphosis that was being attempted there.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertError {
    kind: ErrorKind,
    path: KeyPath,
    metamorphosis: Option<Metamorphosis>,
}

pub type ConvertResult<T> = Result<T, ConvertError>;

impl ConvertError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: KeyPath::default(),
            metamorphosis: None,
        }
    }

    pub fn schema_not_valid(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaNotValid(msg.into()))
    }

    pub fn schemas_dont_match(key: impl fmt::Display, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemasDontMatch {
            key: key.to_string(),
            detail: detail.into(),
        })
    }

    pub fn no_converter(requested: Metamorphosis) -> Self {
        Self::new(ErrorKind::NoConverterFound(requested))
    }

    pub fn ambiguous(requested: Metamorphosis, candidates: Vec<Metamorphosis>) -> Self {
        Self::new(ErrorKind::AmbiguousConversion {
            requested,
            candidates,
        })
    }

    pub fn unknown_setting(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownSetting(name.into()))
    }

    pub fn setting_type(
        name: impl Into<String>,
        expected: impl fmt::Display,
        got: impl fmt::Display,
    ) -> Self {
        Self::new(ErrorKind::SettingType {
            name: name.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        })
    }

    pub fn cyclic(type_key: TypeKey) -> Self {
        Self::new(ErrorKind::CyclicStructure(type_key))
    }

    pub fn depth_exceeded(max: usize) -> Self {
        Self::new(ErrorKind::DepthExceeded(max))
    }

    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Adapter(msg.into()))
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue(msg.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    pub fn metamorphosis(&self) -> Option<&Metamorphosis> {
        self.metamorphosis.as_ref()
    }

    /// Prepend `key` to the path. Called while unwinding, so the finished path
    /// reads from the root down.
    pub fn with_key(mut self, key: Key) -> Self {
        self.path.0.insert(0, key);
        self
    }

    /// Record the attempted metamorphosis unless a deeper frame already did.
    pub fn with_metamorphosis(mut self, mm: &Metamorphosis) -> Self {
        if self.metamorphosis.is_none() {
            self.metamorphosis = Some(mm.clone());
        }
        self
    }
}

impl From<ErrorKind> for ConvertError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_root() {
            write!(f, "at {}: ", self.path)?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(mm) = &self.metamorphosis {
            write!(f, " (converting {mm})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
