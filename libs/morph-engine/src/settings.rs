use std::fmt;

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::metamorphosis::Metamorphosis;
use morph_api::schema::Shape;
use morph_api::value::Key;

use crate::cast::CastProto;

/// How an incoming value combines with the one already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Last write wins.
    Replace,
    /// Union of two maps, incoming wins on key collision. Non-map values are replaced.
    MergeShallow,
    /// Keep the current value.
    Ignore,
}

impl Strategy {
    fn apply(self, current: Option<&SettingValue>, incoming: &SettingValue) -> SettingValue {
        match (self, current) {
            (_, None) | (Strategy::Replace, Some(_)) => incoming.clone(),
            (Strategy::Ignore, Some(current)) => current.clone(),
            (Strategy::MergeShallow, Some(current)) => match (current, incoming) {
                (SettingValue::Map(old), SettingValue::Map(new)) => {
                    let mut merged = old.clone();
                    for (key, value) in new {
                        match merged.iter_mut().find(|(k, _)| k == key) {
                            Some(entry) => entry.1 = value.clone(),
                            None => merged.push((key.clone(), value.clone())),
                        }
                    }
                    SettingValue::Map(merged)
                }
                _ => incoming.clone(),
            },
        }
    }
}

/// Declared type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Int,
    Str,
    List,
    Map,
    Cast,
    Shape,
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingKind::Bool => "bool",
            SettingKind::Int => "int",
            SettingKind::Str => "str",
            SettingKind::List => "list",
            SettingKind::Map => "map",
            SettingKind::Cast => "cast",
            SettingKind::Shape => "shape",
        };
        f.write_str(name)
    }
}

/// Key of a map-valued setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// Item key, e.g. in `key_to_cast`.
    Key(Key),
    /// Conversion intent, e.g. in `mm_to_cast`.
    Mm(Metamorphosis),
}

impl From<Key> for SettingKey {
    fn from(key: Key) -> Self {
        SettingKey::Key(key)
    }
}

impl From<&str> for SettingKey {
    fn from(key: &str) -> Self {
        SettingKey::Key(Key::from(key))
    }
}

impl From<Metamorphosis> for SettingKey {
    fn from(mm: Metamorphosis) -> Self {
        SettingKey::Mm(mm)
    }
}

#[derive(Debug, Clone)]
pub enum SettingValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<SettingValue>),
    Map(Vec<(SettingKey, SettingValue)>),
    Cast(CastProto),
    Shape(Shape),
}

impl SettingValue {
    /// `None` for `Null`, which fits every kind.
    pub fn kind(&self) -> Option<SettingKind> {
        match self {
            SettingValue::Null => None,
            SettingValue::Bool(_) => Some(SettingKind::Bool),
            SettingValue::Int(_) => Some(SettingKind::Int),
            SettingValue::Str(_) => Some(SettingKind::Str),
            SettingValue::List(_) => Some(SettingKind::List),
            SettingValue::Map(_) => Some(SettingKind::Map),
            SettingValue::Cast(_) => Some(SettingKind::Cast),
            SettingValue::Shape(_) => Some(SettingKind::Shape),
        }
    }

    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<SettingKey>,
        V: Into<SettingValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        SettingValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn kind_name(&self) -> String {
        self.kind().map_or_else(|| "null".to_string(), |k| k.to_string())
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Int(i64::from(v))
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Str(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::Str(v)
    }
}

impl From<CastProto> for SettingValue {
    fn from(v: CastProto) -> Self {
        SettingValue::Cast(v)
    }
}

impl From<Shape> for SettingValue {
    fn from(v: Shape) -> Self {
        SettingValue::Shape(v)
    }
}

/// Declaration of a single setting.
#[derive(Debug, Clone)]
pub struct SettingDecl {
    pub name: String,
    pub default: SettingValue,
    pub expected: Option<SettingKind>,
    /// Used when static configuration composes along a prototype lineage.
    pub override_strategy: Strategy,
    /// Used when a parent step hands its configuration to a resolved child.
    pub customize_strategy: Strategy,
}

impl SettingDecl {
    /// Untyped setting, replaced on both paths.
    pub fn new(name: impl Into<String>, default: impl Into<SettingValue>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            expected: None,
            override_strategy: Strategy::Replace,
            customize_strategy: Strategy::Replace,
        }
    }

    pub fn expect(mut self, kind: SettingKind) -> Self {
        self.expected = Some(kind);
        self
    }

    pub fn on_override(mut self, strategy: Strategy) -> Self {
        self.override_strategy = strategy;
        self
    }

    pub fn on_customize(mut self, strategy: Strategy) -> Self {
        self.customize_strategy = strategy;
        self
    }

    fn check(&self, value: &SettingValue) -> ConvertResult<()> {
        match (self.expected, value.kind()) {
            (Some(expected), Some(got)) if expected != got => {
                Err(ConvertError::setting_type(&self.name, expected, got))
            }
            _ => Ok(()),
        }
    }
}

/// Declared, typed key/value store attached to every cast.
///
/// Every value belongs to a declared setting; reading or writing anything
/// else fails with `UnknownSetting`.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    decls: Vec<SettingDecl>,
    values: Vec<(String, SettingValue)>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a setting and reset it to its default.
    pub fn declare(&mut self, decl: SettingDecl) -> ConvertResult<()> {
        decl.check(&decl.default)?;
        self.put(decl.name.clone(), decl.default.clone());
        self.put_decl(decl);
        Ok(())
    }

    /// Builder form of [`Configuration::declare`].
    pub fn with_setting(mut self, decl: SettingDecl) -> ConvertResult<Self> {
        self.declare(decl)?;
        Ok(self)
    }

    /// Undeclared user option (customize = replace), e.g. a flag read by a
    /// leaf cast several levels down.
    pub fn user_option(mut self, name: &str, value: impl Into<SettingValue>) -> ConvertResult<Self> {
        match self.decl(name) {
            Some(_) => self.set(name, value)?,
            None => self.declare(SettingDecl::new(name, value))?,
        }
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decl(name).is_some()
    }

    pub fn decl(&self, name: &str) -> Option<&SettingDecl> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decls.iter().map(|d| d.name.as_str())
    }

    pub fn get(&self, name: &str) -> ConvertResult<&SettingValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ConvertError::unknown_setting(name))
    }

    pub fn get_bool(&self, name: &str) -> ConvertResult<bool> {
        match self.get(name)? {
            SettingValue::Bool(v) => Ok(*v),
            other => Err(ConvertError::setting_type(name, SettingKind::Bool, other.kind_name())),
        }
    }

    pub fn get_int(&self, name: &str) -> ConvertResult<i64> {
        match self.get(name)? {
            SettingValue::Int(v) => Ok(*v),
            other => Err(ConvertError::setting_type(name, SettingKind::Int, other.kind_name())),
        }
    }

    pub fn get_str(&self, name: &str) -> ConvertResult<&str> {
        match self.get(name)? {
            SettingValue::Str(v) => Ok(v),
            other => Err(ConvertError::setting_type(name, SettingKind::Str, other.kind_name())),
        }
    }

    /// `Null` reads as an empty list.
    pub fn get_list(&self, name: &str) -> ConvertResult<&[SettingValue]> {
        match self.get(name)? {
            SettingValue::List(v) => Ok(v),
            SettingValue::Null => Ok(&[]),
            other => Err(ConvertError::setting_type(name, SettingKind::List, other.kind_name())),
        }
    }

    /// `Null` reads as an empty map.
    pub fn get_map(&self, name: &str) -> ConvertResult<&[(SettingKey, SettingValue)]> {
        match self.get(name)? {
            SettingValue::Map(v) => Ok(v),
            SettingValue::Null => Ok(&[]),
            other => Err(ConvertError::setting_type(name, SettingKind::Map, other.kind_name())),
        }
    }

    pub fn get_cast(&self, name: &str) -> ConvertResult<Option<&CastProto>> {
        match self.get(name)? {
            SettingValue::Cast(v) => Ok(Some(v)),
            SettingValue::Null => Ok(None),
            other => Err(ConvertError::setting_type(name, SettingKind::Cast, other.kind_name())),
        }
    }

    pub fn get_shape(&self, name: &str) -> ConvertResult<Option<&Shape>> {
        match self.get(name)? {
            SettingValue::Shape(v) => Ok(Some(v)),
            SettingValue::Null => Ok(None),
            other => Err(ConvertError::setting_type(name, SettingKind::Shape, other.kind_name())),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>) -> ConvertResult<()> {
        let value = value.into();
        let decl = self.decl(name).ok_or_else(|| ConvertError::unknown_setting(name))?;
        decl.check(&value)?;
        self.put(name.to_string(), value);
        Ok(())
    }

    /// Static composition: every incoming declaration is merged in (incoming
    /// metadata wins) and its value combined with the incoming override strategy.
    pub fn override_with(&mut self, other: &Configuration) -> ConvertResult<()> {
        for decl in &other.decls {
            let incoming = other.get(&decl.name)?;
            decl.check(incoming)?;
            let merged = decl.override_strategy.apply(self.value(&decl.name), incoming);
            self.put(decl.name.clone(), merged);
            self.put_decl(decl.clone());
        }
        Ok(())
    }

    /// Mapping form of [`Configuration::override_with`]. Names must already
    /// be declared.
    pub fn override_values<N, V, I>(&mut self, values: I) -> ConvertResult<()>
    where
        N: AsRef<str>,
        V: Into<SettingValue>,
        I: IntoIterator<Item = (N, V)>,
    {
        for (name, value) in values {
            self.combine(name.as_ref(), value.into(), |d| d.override_strategy)?;
        }
        Ok(())
    }

    /// Call-time propagation from a parent step.
    ///
    /// Declared settings combine with the receiver's customize strategy.
    /// Settings the receiver does not declare are adopted with their
    /// declaration, unless that declaration says `Ignore`.
    pub fn customize(&mut self, parent: &Configuration) -> ConvertResult<()> {
        for decl in &parent.decls {
            let incoming = parent.get(&decl.name)?;
            match self.decl(&decl.name) {
                Some(own) => {
                    own.check(incoming)?;
                    let merged = own.customize_strategy.apply(self.value(&decl.name), incoming);
                    self.put(decl.name.clone(), merged);
                }
                None if decl.customize_strategy == Strategy::Ignore => {}
                None => {
                    self.put(decl.name.clone(), incoming.clone());
                    self.put_decl(decl.clone());
                }
            }
        }
        Ok(())
    }

    /// Mapping form of [`Configuration::customize`]. Names must already be declared.
    pub fn customize_values<N, V, I>(&mut self, values: I) -> ConvertResult<()>
    where
        N: AsRef<str>,
        V: Into<SettingValue>,
        I: IntoIterator<Item = (N, V)>,
    {
        for (name, value) in values {
            self.combine(name.as_ref(), value.into(), |d| d.customize_strategy)?;
        }
        Ok(())
    }

    /// Compose a lineage: `parents` are listed most significant first and
    /// applied in reverse, then `own` goes last and wins.
    pub fn inherit(parents: &[&Configuration], own: &Configuration) -> ConvertResult<Configuration> {
        let mut settings = Configuration::new();
        for parent in parents.iter().rev() {
            settings.override_with(parent)?;
        }
        settings.override_with(own)?;
        Ok(settings)
    }

    fn combine(
        &mut self,
        name: &str,
        incoming: SettingValue,
        strategy: impl Fn(&SettingDecl) -> Strategy,
    ) -> ConvertResult<()> {
        let decl = self.decl(name).ok_or_else(|| ConvertError::unknown_setting(name))?;
        decl.check(&incoming)?;
        let merged = strategy(decl).apply(self.value(name), &incoming);
        self.put(name.to_string(), merged);
        Ok(())
    }

    fn value(&self, name: &str) -> Option<&SettingValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn put(&mut self, name: String, value: SettingValue) {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    fn put_decl(&mut self, decl: SettingDecl) {
        match self.decls.iter_mut().find(|d| d.name == decl.name) {
            Some(entry) => *entry = decl,
            None => self.decls.push(decl),
        }
    }
}

#[cfg(test)]
mod tests {
    use morph_api::error::ErrorKind;
    use rstest::rstest;

    use super::*;

    fn base() -> Configuration {
        Configuration::new()
            .with_setting(SettingDecl::new("logs", true).expect(SettingKind::Bool))
            .and_then(|c| {
                c.with_setting(
                    SettingDecl::new("tags", SettingValue::map([("a", 1)]))
                        .expect(SettingKind::Map)
                        .on_override(Strategy::MergeShallow)
                        .on_customize(Strategy::Replace),
                )
            })
            .and_then(|c| {
                c.with_setting(
                    SettingDecl::new("include", SettingValue::List(vec![]))
                        .expect(SettingKind::List)
                        .on_customize(Strategy::Ignore),
                )
            })
            .expect("declared")
    }

    fn key(name: &str) -> SettingKey {
        SettingKey::from(name)
    }

    fn tags(settings: &Configuration) -> Vec<(SettingKey, i64)> {
        settings
            .get_map("tags")
            .expect("tags")
            .iter()
            .map(|(k, v)| match v {
                SettingValue::Int(i) => (k.clone(), *i),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn undeclared_names_are_rejected() {
        let mut settings = base();
        assert!(matches!(
            settings.get("nope").unwrap_err().kind(),
            ErrorKind::UnknownSetting(name) if name == "nope"
        ));
        assert!(matches!(
            settings.set("nope", true).unwrap_err().kind(),
            ErrorKind::UnknownSetting(_)
        ));
    }

    #[test]
    fn declared_type_is_enforced() {
        let mut settings = base();
        let err = settings.set("logs", "yes").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SettingType { name, .. } if name == "logs"));
        settings.set("logs", false).expect("bool accepted");
        assert!(!settings.get_bool("logs").expect("bool"));
    }

    #[test]
    fn override_and_customize_use_their_own_strategy() {
        let incoming = SettingValue::map([("b", 2)]);

        let mut overridden = base();
        overridden.override_values([("tags", incoming.clone())]).expect("override");
        assert_eq!(tags(&overridden), vec![(key("a"), 1i64), (key("b"), 2i64)]);

        let mut customized = base();
        customized.customize_values([("tags", incoming)]).expect("customize");
        assert_eq!(tags(&customized), vec![(key("b"), 2i64)]);
    }

    #[rstest]
    #[case::declared_replace("logs", true)]
    #[case::declared_ignore("include", false)]
    fn customize_from_parent(#[case] name: &str, #[case] propagates: bool) {
        let mut parent = base();
        parent.set("logs", false).expect("set");
        parent
            .set("include", SettingValue::List(vec![SettingValue::from("x")]))
            .expect("set");

        let mut child = base();
        child.customize(&parent).expect("customize");
        let changed = match name {
            "logs" => !child.get_bool("logs").expect("logs"),
            _ => !child.get_list("include").expect("include").is_empty(),
        };
        assert_eq!(changed, propagates);
    }

    #[test]
    fn customize_adopts_undeclared_options_unless_ignored() {
        let parent = Configuration::new()
            .user_option("date_format", "%Y")
            .and_then(|c| {
                c.with_setting(SettingDecl::new("value_cast", SettingValue::Null).on_customize(Strategy::Ignore))
            })
            .expect("parent");
        let mut child = Configuration::new();
        child.customize(&parent).expect("customize");
        assert_eq!(child.get_str("date_format").ok(), Some("%Y"));
        assert!(!child.contains("value_cast"));
    }

    #[test]
    fn inheritance_applies_most_specific_last() {
        let declare = |value: i64| {
            Configuration::new()
                .with_setting(
                    SettingDecl::new("tags", SettingValue::map([("k", value), (format!("only{value}").as_str(), value)]))
                        .on_override(Strategy::MergeShallow),
                )
                .expect("declared")
        };
        let (first, second, own) = (declare(1), declare(2), declare(3));

        // `first` is the most significant parent, so it is applied after `second`.
        let parents_only = Configuration::inherit(&[&first, &second], &Configuration::new()).expect("inherit");
        let merged = tags(&parents_only);
        assert_eq!(merged[0], (key("k"), 1i64));
        assert!(merged.contains(&(key("only2"), 2)));
        assert!(merged.contains(&(key("only1"), 1)));

        let with_own = Configuration::inherit(&[&first, &second], &own).expect("inherit");
        assert_eq!(tags(&with_own)[0], (key("k"), 3i64));
        assert_eq!(tags(&with_own).len(), 4);
    }
}
