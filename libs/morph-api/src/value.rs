use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::types::{builtin, TypeKey};

/// Canonical value representation.
///
/// Strategy by shape:
/// - Scalars (Null, Bool, Int, Float, Str): plain values, type from the variant
/// - List, Map: owned, ordered; cloning never aliases the container
/// - Record: shared handle with identity (`Arc`), typed by its [`TypeKey`],
///   the only shape that can form cycles
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Mapping),
    Record(Record),
}

impl Value {
    /// Concrete runtime type of the value.
    pub fn type_key(&self) -> TypeKey {
        match self {
            Value::Null => TypeKey::new(builtin::NONE),
            Value::Bool(_) => TypeKey::new(builtin::BOOL),
            Value::Int(_) => TypeKey::new(builtin::INT),
            Value::Float(_) => TypeKey::new(builtin::FLOAT),
            Value::Str(_) => TypeKey::new(builtin::STR),
            Value::List(_) => TypeKey::new(builtin::LIST),
            Value::Map(_) => TypeKey::new(builtin::MAP),
            Value::Record(record) => record.type_key(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Copy that shares no record instance with `self`, however deep.
    ///
    /// A record reached twice is copied once, so shared and cyclic
    /// references keep their shape on the copy.
    pub fn deep_copy(&self) -> Value {
        self.copy_into(&mut HashMap::new())
    }

    fn copy_into(&self, copies: &mut HashMap<usize, Record>) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(|v| v.copy_into(copies)).collect()),
            Value::Map(mapping) => Value::Map(
                mapping
                    .iter()
                    .map(|(k, v)| (k.clone(), v.copy_into(copies)))
                    .collect(),
            ),
            Value::Record(record) => Value::Record(record.copy_into(copies)),
            scalar => scalar.clone(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Mapping> for Value {
    fn from(v: Mapping) -> Self {
        Value::Map(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Int(i) => Value::Int(i),
            Key::Str(s) => Value::Str(s),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (Key::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Address of an item inside a structured value: an index, a mapping key or a
/// record field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl TryFrom<Value> for Key {
    type Error = Value;

    /// Only integers and strings can act as keys; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(i) => Ok(Key::Int(i)),
            Value::Str(s) => Ok(Key::Str(s)),
            other => Err(other),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Key::Int(i) => serializer.serialize_i64(*i),
            Key::Str(s) => serializer.serialize_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Insertion-ordered key/value container.
///
/// Equality ignores order, iteration follows it.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<(Key, Value)>,
    index: HashMap<Key, usize>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&at) => self.entries[at].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Builder form of [`Mapping::insert`].
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.index.get(key).map(|&at| &self.entries[at].1)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Key, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|theirs| theirs == v))
    }
}

impl FromIterator<(Key, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (Key, Value);
    type IntoIter = std::vec::IntoIter<(Key, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RecordData {
    type_key: TypeKey,
    fields: Vec<(String, Value)>,
}

/// Shared, mutable, typed bag of named fields.
///
/// Clones share the same instance; [`Record::id`] identifies it. Records may
/// point back at themselves, so `Debug`, `PartialEq` and `Serialize` track the
/// records they are currently visiting instead of recursing forever.
#[derive(Clone)]
pub struct Record(Arc<RwLock<RecordData>>);

thread_local! {
    static DEBUG_VISITING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static EQ_VISITING: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
    static SER_VISITING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

impl Record {
    /// Blank instance of `type_key`.
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self::with_fields(type_key, Vec::<(String, Value)>::new())
    }

    pub fn with_fields<N, I>(type_key: impl Into<TypeKey>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Value)>,
    {
        let record = Self(Arc::new(RwLock::new(RecordData {
            type_key: type_key.into(),
            fields: Vec::new(),
        })));
        for (name, value) in fields {
            record.set(name, value);
        }
        record
    }

    pub fn type_key(&self) -> TypeKey {
        self.read().type_key.clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read()
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Set a field, keeping its position if it already exists.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut data = self.write();
        if let Some(entry) = data.fields.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            data.fields.push((name, value));
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.read().fields.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn fields(&self) -> Vec<(String, Value)> {
        self.read().fields.clone()
    }

    /// Identity of the underlying instance.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// See [`Value::deep_copy`].
    pub fn deep_copy(&self) -> Record {
        self.copy_into(&mut HashMap::new())
    }

    fn copy_into(&self, copies: &mut HashMap<usize, Record>) -> Record {
        if let Some(copy) = copies.get(&self.id()) {
            return copy.clone();
        }
        let data = self.read().clone();
        let copy = Record::new(data.type_key);
        copies.insert(self.id(), copy.clone());
        for (name, value) in data.fields {
            copy.set(name, value.copy_into(copies));
        }
        copy
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordData> {
        match self.0.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RecordData> {
        match self.0.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Pushes `item` on a thread-local visiting stack for the lifetime of the guard.
struct Visit<T: Copy + PartialEq + 'static> {
    stack: &'static std::thread::LocalKey<RefCell<Vec<T>>>,
}

impl<T: Copy + PartialEq + 'static> Visit<T> {
    /// `None` if `item` is already being visited.
    fn enter(stack: &'static std::thread::LocalKey<RefCell<Vec<T>>>, item: T) -> Option<Self> {
        stack.with(|s| {
            let mut s = s.borrow_mut();
            if s.contains(&item) {
                None
            } else {
                s.push(item);
                Some(Self { stack })
            }
        })
    }
}

impl<T: Copy + PartialEq + 'static> Drop for Visit<T> {
    fn drop(&mut self) {
        self.stack.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.read().clone();
        let Some(_visit) = Visit::enter(&DEBUG_VISITING, self.id()) else {
            return write!(f, "{}{{..}}", data.type_key);
        };
        let mut s = f.debug_struct(data.type_key.as_str());
        for (name, value) in &data.fields {
            s.field(name, value);
        }
        s.finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let Some(_visit) = Visit::enter(&EQ_VISITING, (self.id(), other.id())) else {
            // Already comparing this pair further up: assume equal.
            return true;
        };
        let (mine, theirs) = (self.read().clone(), other.read().clone());
        mine.type_key == theirs.type_key
            && mine.fields.len() == theirs.fields.len()
            && mine.fields.iter().all(|(name, value)| {
                theirs
                    .fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .is_some_and(|(_, v)| v == value)
            })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some(_visit) = Visit::enter(&SER_VISITING, self.id()) else {
            return Err(S::Error::custom(format!(
                "cyclic record of type '{}'",
                self.type_key()
            )));
        };
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, value) in &fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(mapping) => mapping.serialize(serializer),
            Value::Record(record) => record.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_equality_ignores_order() {
        let a = Mapping::new().with("a", 1).with("b", "x");
        let b = Mapping::new().with("b", "x").with("a", 1);
        assert_eq!(a, b);
        assert_eq!(a.keys().collect::<Vec<_>>(), [&Key::from("a"), &Key::from("b")]);
    }

    #[test]
    fn mapping_insert_replaces_in_place() {
        let mut m = Mapping::new().with(1, 78).with("a", "x");
        m.insert(1, 79);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(&Key::Int(1)), Some(&Value::Int(79)));
        assert_eq!(m.keys().next(), Some(&Key::Int(1)));
    }

    #[test]
    fn large_mappings_keep_order_and_lookups() {
        let mapping: Mapping = (0..10_000).map(|i| (Key::Int(i), Value::Int(i * 2))).collect();
        assert_eq!(mapping.len(), 10_000);
        assert_eq!(mapping.get(&Key::Int(9_999)), Some(&Value::Int(19_998)));
        assert!(!mapping.contains_key(&Key::from("9999")));
        assert_eq!(mapping.keys().nth(42), Some(&Key::Int(42)));
    }

    #[test]
    fn records_share_identity_on_clone() {
        let record = Record::with_fields("Book", [("title", Value::from("1984"))]);
        let alias = record.clone();
        alias.set("title", Value::from("animal farm"));
        assert_eq!(record.get("title"), Some(Value::from("animal farm")));
        assert!(record.ptr_eq(&alias));
        let copy = record.deep_copy();
        assert!(!copy.ptr_eq(&record));
        assert_eq!(copy, record);
    }

    #[test]
    fn deep_copies_share_no_record() {
        let child = Record::with_fields("Note", [("text", Value::from("hi"))]);
        let parent = Record::with_fields("Note", [("child", Value::from(child.clone()))]);
        let value = Value::from(Mapping::new().with("note", parent.clone()).with("again", child.clone()));

        let copy = value.deep_copy();
        assert_eq!(copy, value);
        let map = copy.as_map().expect("map");
        let copied_parent = map.get(&Key::from("note")).and_then(Value::as_record).expect("record");
        let copied_child = copied_parent.get("child").and_then(|v| v.as_record().cloned()).expect("record");
        assert!(!copied_parent.ptr_eq(&parent));
        assert!(!copied_child.ptr_eq(&child));
        // Both references to the child point at the same copy.
        let again = map.get(&Key::from("again")).and_then(Value::as_record).expect("record");
        assert!(again.ptr_eq(&copied_child));

        copied_child.set("text", Value::from("mutated"));
        assert_eq!(child.get("text"), Some(Value::from("hi")));
    }

    #[test]
    fn deep_copy_keeps_cycles() {
        let node = Record::new("Node");
        node.set("next", Value::Record(node.clone()));
        let copy = node.deep_copy();
        let next = copy.get("next").and_then(|v| v.as_record().cloned()).expect("record");
        assert!(next.ptr_eq(&copy));
        assert!(!copy.ptr_eq(&node));
        node.set("next", Value::Null);
        copy.set("next", Value::Null);
    }

    #[test]
    fn cyclic_records_do_not_recurse_forever() {
        let node = Record::new("Node");
        node.set("next", Value::Record(node.clone()));
        let other = Record::new("Node");
        other.set("next", Value::Record(other.clone()));

        assert_eq!(node, other);
        assert!(format!("{node:?}").contains("Node{..}"));
        assert!(serde_json::to_string(&Value::Record(node)).is_err());
    }

    #[test]
    fn json_objects_become_string_keyed_mappings() {
        let json = serde_json::json!({"name": "George Orwell", "books": [{"title": "1984"}], "age": 46.5});
        let value = Value::from(json.clone());
        let map = value.as_map().expect("map");
        assert_eq!(map.get(&Key::from("name")), Some(&Value::from("George Orwell")));
        assert_eq!(map.get(&Key::from("age")), Some(&Value::Float(46.5)));
        assert_eq!(serde_json::to_value(&value).expect("serialize"), json);
    }
}
