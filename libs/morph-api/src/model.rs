use std::fmt;
use std::sync::Arc;

use crate::error::{ConvertError, ConvertResult};
use crate::schema::{Schema, Shape};
use crate::types::{builtin, TypeHierarchy, TypeKey};
use crate::value::{Key, Record, Value};

/// Reads one field of an instance.
pub type Getter = Arc<dyn Fn(&Record, &str) -> ConvertResult<Value> + Send + Sync>;
/// Writes one field of an instance.
pub type Setter = Arc<dyn Fn(&Record, &str, Value) -> ConvertResult<()> + Send + Sync>;
/// Produces a blank instance, given the keys about to be set.
pub type Constructor = Arc<dyn Fn(&[Key]) -> ConvertResult<Record> + Send + Sync>;

/// Boundary between the engine and an object model.
///
/// The engine never looks inside a record on its own: schemas, field access
/// and construction all go through the adapter registered for the type.
pub trait ObjectAdapter: Send + Sync + fmt::Debug {
    fn type_key(&self) -> &TypeKey;

    /// Direct parents, most significant first.
    fn parents(&self) -> &[TypeKey];

    /// Default schema, available without an instance.
    fn schema(&self) -> &Schema;

    fn get(&self, instance: &Record, name: &str, types: &TypeHierarchy) -> ConvertResult<Value>;

    fn set(&self, instance: &Record, name: &str, value: Value, types: &TypeHierarchy) -> ConvertResult<()>;

    fn construct(&self, keys: &[Key]) -> ConvertResult<Record>;
}

#[derive(Clone)]
struct FieldDef {
    name: String,
    shape: Shape,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

/// Declarative [`ObjectAdapter`]: a schema plus a capability table.
///
/// Field access is resolved in this order:
/// 1. the getter/setter registered for the field name,
/// 2. the getter/setter registered for the closest ancestor of the field's
///    declared type,
/// 3. plain field access on the record.
#[derive(Clone)]
pub struct ModelDef {
    type_key: TypeKey,
    parents: Vec<TypeKey>,
    explicit_parents: bool,
    fields: Vec<FieldDef>,
    schema: Schema,
    type_getters: Vec<(TypeKey, Getter)>,
    type_setters: Vec<(TypeKey, Setter)>,
    constructor: Option<Constructor>,
}

impl ModelDef {
    /// New model descending from `record`.
    pub fn new(name: impl Into<TypeKey>) -> Self {
        Self {
            type_key: name.into(),
            parents: vec![TypeKey::new(builtin::RECORD)],
            explicit_parents: false,
            fields: Vec::new(),
            schema: Schema::default(),
            type_getters: Vec::new(),
            type_setters: Vec::new(),
            constructor: None,
        }
    }

    /// Add a parent. The first call replaces the implicit `record` parent.
    pub fn parent(mut self, parent: impl Into<TypeKey>) -> Self {
        if !self.explicit_parents {
            self.parents.clear();
            self.explicit_parents = true;
        }
        self.parents.push(parent.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, shape: Shape) -> Self {
        let name = name.into();
        self.schema = std::mem::take(&mut self.schema).with(name.as_str(), shape.clone());
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.shape = shape,
            None => self.fields.push(FieldDef {
                name,
                shape,
                getter: None,
                setter: None,
            }),
        }
        self
    }

    /// Field-specific getter. Undeclared names become fields of any shape.
    pub fn getter<F>(mut self, name: &str, getter: F) -> Self
    where
        F: Fn(&Record, &str) -> ConvertResult<Value> + Send + Sync + 'static,
    {
        self.field_mut(name).getter = Some(Arc::new(getter));
        self
    }

    /// Field-specific setter, e.g. for virtual fields derived from others.
    pub fn setter<F>(mut self, name: &str, setter: F) -> Self
    where
        F: Fn(&Record, &str, Value) -> ConvertResult<()> + Send + Sync + 'static,
    {
        self.field_mut(name).setter = Some(Arc::new(setter));
        self
    }

    /// Getter for every field whose declared type descends from `ty`.
    pub fn type_getter<F>(mut self, ty: impl Into<TypeKey>, getter: F) -> Self
    where
        F: Fn(&Record, &str) -> ConvertResult<Value> + Send + Sync + 'static,
    {
        self.type_getters.push((ty.into(), Arc::new(getter)));
        self
    }

    pub fn type_setter<F>(mut self, ty: impl Into<TypeKey>, setter: F) -> Self
    where
        F: Fn(&Record, &str, Value) -> ConvertResult<()> + Send + Sync + 'static,
    {
        self.type_setters.push((ty.into(), Arc::new(setter)));
        self
    }

    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&[Key]) -> ConvertResult<Record> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    fn field_mut(&mut self, name: &str) -> &mut FieldDef {
        let index = match self.fields.iter().position(|f| f.name == name) {
            Some(index) => index,
            None => {
                self.schema = std::mem::take(&mut self.schema).with(name, Shape::Any);
                self.fields.push(FieldDef {
                    name: name.to_string(),
                    shape: Shape::Any,
                    getter: None,
                    setter: None,
                });
                self.fields.len() - 1
            }
        };
        &mut self.fields[index]
    }

    fn declared(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Capability registered for the closest ancestor of the field's type.
    fn by_type<'a, T>(
        &self,
        table: &'a [(TypeKey, T)],
        field: Option<&FieldDef>,
        types: &TypeHierarchy,
    ) -> Option<&'a T> {
        let ty = field?.shape.type_key()?;
        let keys: Vec<TypeKey> = table.iter().map(|(k, _)| k.clone()).collect();
        let closest = types.closest(ty, &keys)?;
        table.iter().find(|(k, _)| k == closest).map(|(_, cap)| cap)
    }
}

impl ObjectAdapter for ModelDef {
    fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    fn parents(&self) -> &[TypeKey] {
        &self.parents
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn get(&self, instance: &Record, name: &str, types: &TypeHierarchy) -> ConvertResult<Value> {
        let field = self.declared(name);
        if let Some(getter) = field.and_then(|f| f.getter.as_ref()) {
            return getter(instance, name);
        }
        if let Some(getter) = self.by_type(&self.type_getters, field, types) {
            return getter(instance, name);
        }
        instance.get(name).ok_or_else(|| {
            ConvertError::adapter(format!(
                "'{}' instance has no field '{name}'",
                instance.type_key()
            ))
        })
    }

    fn set(&self, instance: &Record, name: &str, value: Value, types: &TypeHierarchy) -> ConvertResult<()> {
        let field = self.declared(name);
        if let Some(setter) = field.and_then(|f| f.setter.as_ref()) {
            return setter(instance, name, value);
        }
        if let Some(setter) = self.by_type(&self.type_setters, field, types) {
            return setter(instance, name, value);
        }
        instance.set(name, value);
        Ok(())
    }

    fn construct(&self, keys: &[Key]) -> ConvertResult<Record> {
        match &self.constructor {
            Some(constructor) => constructor(keys),
            None => Ok(Record::new(self.type_key.clone())),
        }
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("type_key", &self.type_key)
            .field("parents", &self.parents)
            .field("schema", &self.schema)
            .field("type_getters", &self.type_getters.len())
            .field("type_setters", &self.type_setters.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Typed Rust values
// ---------------------------------------------------------------------------

/// Rust type with a known [`Shape`].
pub trait Typed {
    fn shape() -> Shape;
}

pub trait ToValue {
    fn to_value(&self) -> Value;
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> ConvertResult<Self>;
}

/// Rust struct mapped onto records. Usually derived with `#[derive(Model)]`.
pub trait Model: Typed + ToValue + FromValue {
    fn model_def() -> ModelDef;
}

fn mismatch(expected: &str, got: &Value) -> ConvertError {
    ConvertError::adapter(format!("expected {expected}, got {}", got.type_key()))
}

macro_rules! scalar_model {
    ($ty:ty, $name:expr, $variant:ident) => {
        impl Typed for $ty {
            fn shape() -> Shape {
                Shape::ty($name)
            }
        }

        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> ConvertResult<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch($name, &other)),
                }
            }
        }
    };
}

scalar_model!(bool, builtin::BOOL, Bool);
scalar_model!(i64, builtin::INT, Int);
scalar_model!(String, builtin::STR, Str);

impl Typed for i32 {
    fn shape() -> Shape {
        Shape::ty(builtin::INT)
    }
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> ConvertResult<Self> {
        match value {
            Value::Int(v) => i32::try_from(v)
                .map_err(|_| ConvertError::adapter(format!("{v} does not fit in 32 bits"))),
            other => Err(mismatch(builtin::INT, &other)),
        }
    }
}

impl Typed for f64 {
    fn shape() -> Shape {
        Shape::ty(builtin::FLOAT)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> ConvertResult<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(mismatch(builtin::FLOAT, &other)),
        }
    }
}

impl Typed for Value {
    fn shape() -> Shape {
        Shape::Any
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> ConvertResult<Self> {
        Ok(value)
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn shape() -> Shape {
        Shape::list_of(T::shape())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> ConvertResult<Self> {
        match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|e| e.with_key(Key::from(i))))
                .collect(),
            other => Err(mismatch(builtin::LIST, &other)),
        }
    }
}

/// `None` is carried as `Value::Null`.
impl<T: Typed> Typed for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> ConvertResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// The record inside `value`, which must be of type `name`.
pub fn expect_record(value: &Value, name: &str) -> ConvertResult<Record> {
    match value {
        Value::Record(record) if record.type_key().as_str() == name => Ok(record.clone()),
        other => Err(mismatch(name, other)),
    }
}

/// Read and decode one field. A missing field reads as `Null`.
pub fn read_field<T: FromValue>(record: &Record, name: &str) -> ConvertResult<T> {
    T::from_value(record.get(name).unwrap_or(Value::Null))
        .map_err(|e| e.with_key(Key::from(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn person() -> ModelDef {
        ModelDef::new("Person")
            .field("first", Shape::ty(builtin::STR))
            .field("last", Shape::ty(builtin::STR))
            .field("born", Shape::ty("Date"))
            .setter("full_name", |record, _, value| {
                let full = value
                    .as_str()
                    .ok_or_else(|| ConvertError::adapter("full_name must be a string"))?
                    .to_string();
                let (first, last) = full.split_once(' ').unwrap_or((full.as_str(), ""));
                record.set("first", Value::from(first));
                record.set("last", Value::from(last));
                Ok(())
            })
            .type_getter("Date", |record, name| {
                Ok(Value::from(format!("date:{}", record.get(name).and_then(|v| v.as_int()).unwrap_or(0))))
            })
    }

    fn types() -> TypeHierarchy {
        let mut types = TypeHierarchy::new();
        types.declare("Date".into(), vec![]);
        types
    }

    #[test]
    fn field_setter_wins_over_plain_access() {
        let model = person();
        let record = model.construct(&[]).expect("construct");
        model
            .set(&record, "full_name", Value::from("George Orwell"), &types())
            .expect("set");
        assert_eq!(record.get("first"), Some(Value::from("George")));
        assert_eq!(record.get("last"), Some(Value::from("Orwell")));
        assert_eq!(record.get("full_name"), None);
        assert!(model.schema().admits(&Key::from("full_name")));
    }

    #[test]
    fn type_getter_applies_to_fields_of_that_type() {
        let model = person();
        let record = Record::with_fields("Person", [("first", Value::from("a")), ("born", Value::from(1903))]);
        let types = types();
        assert_eq!(model.get(&record, "born", &types).ok(), Some(Value::from("date:1903")));
        assert_eq!(model.get(&record, "first", &types).ok(), Some(Value::from("a")));
    }

    #[test]
    fn missing_field_is_an_adapter_error() {
        let model = person();
        let record = Record::new("Person");
        let err = model.get(&record, "first", &types()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Adapter(_)));
    }

    #[test]
    fn explicit_parents_replace_record() {
        let model = ModelDef::new("Daily").parent("Journal").parent("Tagged");
        assert_eq!(model.parents(), &[TypeKey::new("Journal"), TypeKey::new("Tagged")]);
        assert_eq!(ModelDef::new("Book").parents(), &[TypeKey::new(builtin::RECORD)]);
    }

    #[test]
    fn vec_decoding_names_the_failing_index() {
        let value = Value::List(vec![Value::from(1), Value::from("two")]);
        let err = Vec::<i64>::from_value(value).unwrap_err();
        assert_eq!(err.path().to_string(), "$[1]");
    }
}
