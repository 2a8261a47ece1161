use std::collections::HashMap;
use std::fmt;

use crate::error::{ConvertError, ConvertResult};
use crate::types::{builtin, TypeKey, TypeSet};
use crate::value::{Key, Value};

/// Key of a schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaKey {
    Key(Key),
    /// Items under keys that are not listed explicitly.
    Any,
    /// The value is a leaf and must not be decomposed. Excludes every other key.
    Final,
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Any => f.write_str("<any>"),
            Self::Final => f.write_str("<final>"),
        }
    }
}

impl From<Key> for SchemaKey {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<&str> for SchemaKey {
    fn from(name: &str) -> Self {
        Self::Key(Key::from(name))
    }
}

impl From<i64> for SchemaKey {
    fn from(index: i64) -> Self {
        Self::Key(Key::Int(index))
    }
}

/// Expected shape of a value: a type, optionally with a declared item schema.
///
/// Doubles as the shape descriptor handed to `convert`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Shape {
    #[default]
    Any,
    Type(TypeKey),
    /// Homogeneous container, e.g. a list of `Book`.
    Of { container: TypeKey, item: Box<Shape> },
    /// Container with an explicit item schema.
    Schema { container: TypeKey, schema: Schema },
}

impl Shape {
    pub fn any() -> Self {
        Self::Any
    }

    pub fn ty(ty: impl Into<TypeKey>) -> Self {
        Self::Type(ty.into())
    }

    pub fn list_of(item: Shape) -> Self {
        Self::Of {
            container: TypeKey::new(builtin::LIST),
            item: Box::new(item),
        }
    }

    pub fn map_of(item: Shape) -> Self {
        Self::Of {
            container: TypeKey::new(builtin::MAP),
            item: Box::new(item),
        }
    }

    pub fn schema(container: impl Into<TypeKey>, schema: Schema) -> Self {
        Self::Schema {
            container: container.into(),
            schema,
        }
    }

    /// Mapping with the given schema.
    pub fn map(schema: Schema) -> Self {
        Self::schema(builtin::MAP, schema)
    }

    pub fn type_key(&self) -> Option<&TypeKey> {
        match self {
            Self::Any => None,
            Self::Type(ty) => Some(ty),
            Self::Of { container, .. } | Self::Schema { container, .. } => Some(container),
        }
    }

    /// Destination pattern for resolution. A named type is requested exactly.
    pub fn type_set(&self) -> TypeSet {
        match self.type_key() {
            Some(ty) => TypeSet::Exact(ty.clone()),
            None => TypeSet::Any,
        }
    }

    /// Item schema carried by the shape itself, if any.
    pub fn declared_schema(&self) -> Option<Schema> {
        match self {
            Self::Any | Self::Type(_) => None,
            Self::Of { item, .. } => Some(Schema::default().with_any((**item).clone())),
            Self::Schema { schema, .. } => Some(schema.clone()),
        }
    }
}

impl From<TypeKey> for Shape {
    fn from(ty: TypeKey) -> Self {
        Self::Type(ty)
    }
}

impl From<&str> for Shape {
    fn from(ty: &str) -> Self {
        Self::ty(ty)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Type(ty) => write!(f, "{ty}"),
            Self::Of { container, item } => write!(f, "{container}[{item}]"),
            Self::Schema { container, schema } => write!(f, "{container}{schema}"),
        }
    }
}

/// Structural description of a value's items: key -> expected shape.
///
/// Entries keep declaration order, which is the order records are decomposed in.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<(SchemaKey, Shape)>,
    index: HashMap<SchemaKey, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Schema {
    /// Validated construction.
    pub fn new<K, I>(entries: I) -> ConvertResult<Self>
    where
        K: Into<SchemaKey>,
        I: IntoIterator<Item = (K, Shape)>,
    {
        let mut schema = Self::default();
        for (key, shape) in entries {
            schema.push(key.into(), shape);
        }
        schema.validate()?;
        Ok(schema)
    }

    /// Schema of named fields only. Always valid.
    pub fn fields<N, I>(fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Shape)>,
    {
        let mut schema = Self::default();
        for (name, shape) in fields {
            schema.push(SchemaKey::Key(Key::Str(name.into())), shape);
        }
        schema
    }

    /// `{Final: shape}`.
    pub fn leaf(shape: Shape) -> Self {
        let mut schema = Self::default();
        schema.push(SchemaKey::Final, shape);
        schema
    }

    /// Builder: add or replace an explicit key.
    pub fn with(mut self, key: impl Into<Key>, shape: Shape) -> Self {
        self.push(SchemaKey::Key(key.into()), shape);
        self
    }

    /// Builder: set the wildcard entry.
    pub fn with_any(mut self, shape: Shape) -> Self {
        self.push(SchemaKey::Any, shape);
        self
    }

    /// Add or replace an entry, then check the result is still well formed.
    pub fn insert(&mut self, key: SchemaKey, shape: Shape) -> ConvertResult<()> {
        self.push(key, shape);
        self.validate()
    }

    fn push(&mut self, key: SchemaKey, shape: Shape) {
        match self.index.get(&key) {
            Some(&at) => self.entries[at].1 = shape,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, shape));
            }
        }
    }

    /// Shape declared for `key`: its explicit entry, else the wildcard.
    pub fn get(&self, key: &Key) -> Option<&Shape> {
        self.explicit(key).or_else(|| self.wildcard())
    }

    pub fn explicit(&self, key: &Key) -> Option<&Shape> {
        self.entry(&SchemaKey::Key(key.clone()))
    }

    pub fn wildcard(&self) -> Option<&Shape> {
        self.entry(&SchemaKey::Any)
    }

    pub fn final_shape(&self) -> Option<&Shape> {
        self.entry(&SchemaKey::Final)
    }

    fn entry(&self, key: &SchemaKey) -> Option<&Shape> {
        self.index.get(key).map(|&at| &self.entries[at].1)
    }

    pub fn is_final(&self) -> bool {
        self.final_shape().is_some()
    }

    /// Only a wildcard entry.
    pub fn is_wildcard_only(&self) -> bool {
        matches!(self.entries.as_slice(), [(SchemaKey::Any, _)])
    }

    /// `true` if an item under `key` belongs to a value of this schema.
    pub fn admits(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Explicit keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().filter_map(|(k, _)| match k {
            SchemaKey::Key(key) => Some(key),
            _ => None,
        })
    }

    pub fn entries(&self) -> &[(SchemaKey, Shape)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&SchemaKey) -> bool) {
        let kept = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|(k, _)| keep(k));
        *self = kept.collect();
    }

    /// Entries of `other` on top of ours; `other` wins on collision.
    pub fn merged(mut self, other: &Schema) -> ConvertResult<Self> {
        for (key, shape) in &other.entries {
            self.push(key.clone(), shape.clone());
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConvertResult<()> {
        validate_schema(self)
    }

    /// Schema observed on a runtime value.
    ///
    /// Mappings map each present key to the runtime type of its value,
    /// sequences do the same per index, records per field. Anything else is a
    /// leaf of its own type.
    pub fn improvise(value: &Value) -> Self {
        let observed = |v: &Value| Shape::Type(v.type_key());
        match value {
            Value::Map(mapping) => mapping
                .iter()
                .map(|(k, v)| (SchemaKey::Key(k.clone()), observed(v)))
                .collect(),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (SchemaKey::Key(Key::from(i)), observed(v)))
                .collect(),
            Value::Record(record) => record
                .fields()
                .iter()
                .map(|(name, v)| (SchemaKey::Key(Key::Str(name.clone())), observed(v)))
                .collect(),
            scalar => Self::leaf(observed(scalar)),
        }
    }
}

/// Unvalidated; later entries replace earlier ones under the same key.
impl FromIterator<(SchemaKey, Shape)> for Schema {
    fn from_iter<I: IntoIterator<Item = (SchemaKey, Shape)>>(iter: I) -> Self {
        let mut schema = Self::default();
        for (key, shape) in iter {
            schema.push(key, shape);
        }
        schema
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, shape)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {shape}")?;
        }
        f.write_str("}")
    }
}

/// Fails if the `Final` marker is mixed with any other key.
pub fn validate_schema(schema: &Schema) -> ConvertResult<()> {
    if schema.is_final() && schema.len() > 1 {
        return Err(ConvertError::schema_not_valid(format!(
            "final schema must not declare other keys: {schema}"
        )));
    }
    Ok(())
}

/// Structural compatibility of a source schema with a destination schema.
///
/// - a wildcard-only destination accepts anything
/// - a final schema only matches another final schema
/// - otherwise every explicit destination key must exist in the source,
///   either listed or covered by the source's wildcard
pub fn validate_schemas_match(source: &Schema, destination: &Schema) -> ConvertResult<()> {
    validate_schema(source)?;
    validate_schema(destination)?;

    match (source.is_final(), destination.is_final()) {
        (true, true) => return Ok(()),
        (false, true) => {
            return Err(ConvertError::schemas_dont_match(
                SchemaKey::Final,
                "destination is a leaf but source is structured",
            ));
        }
        (true, false) => {
            return Err(ConvertError::schemas_dont_match(
                SchemaKey::Final,
                "source is a leaf but destination is structured",
            ));
        }
        (false, false) => {}
    }

    if destination.is_wildcard_only() {
        return Ok(());
    }

    match destination.keys().find(|key| !source.admits(key)) {
        Some(missing) => Err(ConvertError::schemas_dont_match(
            missing,
            "required by destination but absent from source",
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::error::ErrorKind;
    use crate::value::Mapping;

    fn int() -> Shape {
        Shape::ty(builtin::INT)
    }

    fn str_() -> Shape {
        Shape::ty(builtin::STR)
    }

    #[test]
    fn final_marker_excludes_other_keys() {
        let err = Schema::new([(SchemaKey::Final, int()), (SchemaKey::from("a"), int())]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SchemaNotValid(_)));

        let mut schema = Schema::leaf(int());
        assert!(schema.insert(SchemaKey::Any, int()).is_err());
    }

    #[test]
    fn wildcard_mixes_with_explicit_keys() {
        let schema = Schema::new([(SchemaKey::from("a"), int()), (SchemaKey::Any, str_())]).expect("valid");
        assert_eq!(schema.get(&Key::from("a")), Some(&int()));
        assert_eq!(schema.get(&Key::from("zzz")), Some(&str_()));
        assert!(schema.admits(&Key::Int(7)));
    }

    #[test]
    fn destination_requiring_missing_key_fails() {
        let source = Schema::fields([("a", int())]);
        let destination = Schema::fields([("a", int()), ("b", str_())]);
        let err = validate_schemas_match(&source, &destination).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::SchemasDontMatch {
                key: "b".into(),
                detail: "required by destination but absent from source".into(),
            }
        );
    }

    #[rstest]
    #[case::wildcards(Schema::default().with_any(int()), Schema::default().with_any(Shape::ty(builtin::FLOAT)))]
    #[case::dropping_fields(Schema::fields([("a", int()), ("b", str_())]), Schema::fields([("a", str_())]))]
    #[case::leaves(Schema::leaf(int()), Schema::leaf(str_()))]
    #[case::source_wildcard_covers(Schema::default().with_any(int()), Schema::fields([("a", int())]))]
    fn compatible_schemas(#[case] source: Schema, #[case] destination: Schema) {
        assert!(validate_schemas_match(&source, &destination).is_ok());
    }

    #[rstest]
    #[case(Schema::leaf(int()), Schema::fields([("a", int())]))]
    #[case(Schema::fields([("a", int())]), Schema::leaf(int()))]
    fn leaves_only_match_leaves(#[case] source: Schema, #[case] destination: Schema) {
        let err = validate_schemas_match(&source, &destination).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SchemasDontMatch { .. }));
    }

    #[test]
    fn lookups_survive_retain() {
        let mut schema = (0..1_000).fold(Schema::default(), |schema, i| schema.with(i, int()));
        schema.retain(|key| matches!(key, SchemaKey::Key(Key::Int(i)) if i % 2 == 1));
        assert_eq!(schema.len(), 500);
        assert_eq!(schema.get(&Key::Int(999)), Some(&int()));
        assert_eq!(schema.get(&Key::Int(998)), None);
        assert_eq!(schema.keys().next(), Some(&Key::Int(1)));
    }

    #[test]
    fn improvised_from_runtime_types() {
        let value = Value::Map(Mapping::new().with(1, 78).with("a", "x"));
        let schema = Schema::improvise(&value);
        assert_eq!(schema.keys().collect::<Vec<_>>(), [&Key::Int(1), &Key::from("a")]);
        assert_eq!(schema.get(&Key::Int(1)), Some(&int()));
        assert_eq!(schema.get(&Key::from("a")), Some(&str_()));

        let list = Schema::improvise(&Value::List(vec![Value::from(1.5)]));
        assert_eq!(list.get(&Key::Int(0)), Some(&Shape::ty(builtin::FLOAT)));

        assert!(Schema::improvise(&Value::from(3)).is_final());
    }

    #[test]
    fn shapes_describe_their_item_schema() {
        let books = Shape::list_of(Shape::ty("Book"));
        assert_eq!(books.type_set(), TypeSet::exact(builtin::LIST));
        assert_eq!(
            books.declared_schema().and_then(|s| s.wildcard().cloned()),
            Some(Shape::ty("Book"))
        );
        assert_eq!(books.to_string(), "list[Book]");
        assert_eq!(Shape::Any.type_set(), TypeSet::Any);
    }
}
