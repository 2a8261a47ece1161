use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Names of the types every hierarchy starts with.
pub mod builtin {
    /// Root of the hierarchy. Every type descends from it.
    pub const OBJECT: &str = "object";
    pub const NONE: &str = "none";
    pub const BOOL: &str = "bool";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const STR: &str = "str";
    /// Ordered sequence.
    pub const LIST: &str = "list";
    /// Ordered key/value container.
    pub const MAP: &str = "map";
    /// Parent of all record-like (object model) types.
    pub const RECORD: &str = "record";
}

/// Name of a concrete runtime type.
///
/// Cheap to clone; compared by name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn object() -> Self {
        Self::new(builtin::OBJECT)
    }

    pub fn is_object(&self) -> bool {
        &*self.0 == builtin::OBJECT
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Subtype relation between [`TypeKey`]s.
///
/// A type may have several parents. Types that were never declared are
/// treated as direct children of `object`.
#[derive(Debug, Clone)]
pub struct TypeHierarchy {
    root: TypeKey,
    parents: HashMap<TypeKey, Vec<TypeKey>>,
}

impl Default for TypeHierarchy {
    fn default() -> Self {
        let mut hierarchy = Self {
            root: TypeKey::object(),
            parents: HashMap::new(),
        };
        hierarchy.parents.insert(TypeKey::object(), Vec::new());
        for name in [
            builtin::NONE,
            builtin::BOOL,
            builtin::INT,
            builtin::FLOAT,
            builtin::STR,
            builtin::LIST,
            builtin::MAP,
            builtin::RECORD,
        ] {
            hierarchy.declare(TypeKey::new(name), Vec::new());
        }
        hierarchy
    }
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `ty` with the given parents (most significant first).
    ///
    /// An empty parent list attaches the type to `object`. Redeclaring a type
    /// replaces its parents.
    pub fn declare(&mut self, ty: TypeKey, parents: Vec<TypeKey>) {
        if ty.is_object() {
            return;
        }
        let parents = if parents.is_empty() {
            vec![self.root.clone()]
        } else {
            parents
        };
        self.parents.insert(ty, parents);
    }

    pub fn contains(&self, ty: &TypeKey) -> bool {
        self.parents.contains_key(ty)
    }

    pub fn parents(&self, ty: &TypeKey) -> &[TypeKey] {
        match self.parents.get(ty) {
            Some(parents) => parents.as_slice(),
            None if ty.is_object() => &[],
            None => std::slice::from_ref(&self.root),
        }
    }

    /// `true` if `ty` is `ancestor` or descends from it.
    pub fn is_subtype(&self, ty: &TypeKey, ancestor: &TypeKey) -> bool {
        if ty == ancestor || ancestor.is_object() {
            return true;
        }
        self.linearize(ty).iter().any(|t| t == ancestor)
    }

    /// `ty` followed by all of its ancestors, nearest first, `object` last.
    pub fn linearize(&self, ty: &TypeKey) -> Vec<TypeKey> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([ty.clone()]);
        while let Some(current) = queue.pop_front() {
            if current.is_object() || !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.parents(&current).iter().cloned());
            order.push(current);
        }
        order.push(self.root.clone());
        order
    }

    /// Of `candidates`, the one nearest to `ty` in its linearization.
    pub fn closest<'a>(&self, ty: &TypeKey, candidates: &'a [TypeKey]) -> Option<&'a TypeKey> {
        self.linearize(ty)
            .iter()
            .find_map(|ancestor| candidates.iter().find(|c| *c == ancestor))
    }
}

/// Outcome of comparing two patterns by the set of types they match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specificity {
    MoreSpecific,
    LessSpecific,
    Equal,
    Incomparable,
}

/// Immutable predicate over concrete types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSet {
    /// Only this type.
    Exact(TypeKey),
    /// This type and all of its descendants.
    SubclassOf(TypeKey),
    /// Every type.
    Any,
}

impl TypeSet {
    pub fn exact(ty: impl Into<TypeKey>) -> Self {
        Self::Exact(ty.into())
    }

    pub fn subclass_of(ty: impl Into<TypeKey>) -> Self {
        Self::SubclassOf(ty.into())
    }

    pub fn type_key(&self) -> Option<&TypeKey> {
        match self {
            Self::Exact(ty) | Self::SubclassOf(ty) => Some(ty),
            Self::Any => None,
        }
    }

    pub fn matches(&self, ty: &TypeKey, types: &TypeHierarchy) -> bool {
        match self {
            Self::Exact(own) => own == ty,
            Self::SubclassOf(own) => types.is_subtype(ty, own),
            Self::Any => true,
        }
    }

    /// `true` if every type matched by `other` is matched by `self`.
    pub fn contains(&self, other: &TypeSet, types: &TypeHierarchy) -> bool {
        match (self, other) {
            (Self::Any, _) => true,
            (_, Self::Any) => false,
            (Self::Exact(own), Self::Exact(theirs)) => own == theirs,
            (Self::Exact(_), Self::SubclassOf(_)) => false,
            (Self::SubclassOf(own), Self::Exact(theirs) | Self::SubclassOf(theirs)) => {
                types.is_subtype(theirs, own)
            }
        }
    }

    pub fn compare(&self, other: &TypeSet, types: &TypeHierarchy) -> Specificity {
        match (other.contains(self, types), self.contains(other, types)) {
            (true, true) => Specificity::Equal,
            (true, false) => Specificity::MoreSpecific,
            (false, true) => Specificity::LessSpecific,
            (false, false) => Specificity::Incomparable,
        }
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(ty) => write!(f, "{ty}"),
            Self::SubclassOf(ty) => write!(f, "{ty}+"),
            Self::Any => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn hierarchy() -> TypeHierarchy {
        let mut types = TypeHierarchy::new();
        types.declare("Journal".into(), vec![builtin::RECORD.into()]);
        types.declare("Tagged".into(), vec![builtin::RECORD.into()]);
        types.declare("Daily".into(), vec!["Journal".into(), "Tagged".into()]);
        types
    }

    #[test]
    fn undeclared_types_hang_off_object() {
        let types = TypeHierarchy::new();
        let ty = TypeKey::new("Unknown");
        assert_eq!(types.parents(&ty), &[TypeKey::object()]);
        assert!(types.is_subtype(&ty, &TypeKey::object()));
        assert!(!types.is_subtype(&ty, &TypeKey::new(builtin::RECORD)));
    }

    #[test]
    fn linearize_is_nearest_first() {
        let types = hierarchy();
        let order: Vec<String> = types
            .linearize(&"Daily".into())
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(order, ["Daily", "Journal", "Tagged", "record", "object"]);
    }

    #[rstest]
    #[case(TypeSet::exact("Journal"), TypeSet::subclass_of("Journal"), Specificity::MoreSpecific)]
    #[case(TypeSet::subclass_of("Journal"), TypeSet::Any, Specificity::MoreSpecific)]
    #[case(TypeSet::Any, TypeSet::exact("Daily"), Specificity::LessSpecific)]
    #[case(TypeSet::subclass_of("Daily"), TypeSet::subclass_of("Journal"), Specificity::MoreSpecific)]
    #[case(TypeSet::subclass_of("Journal"), TypeSet::subclass_of("Journal"), Specificity::Equal)]
    #[case(TypeSet::subclass_of("Journal"), TypeSet::subclass_of("Tagged"), Specificity::Incomparable)]
    #[case(TypeSet::exact("Journal"), TypeSet::exact("Tagged"), Specificity::Incomparable)]
    fn specificity(#[case] a: TypeSet, #[case] b: TypeSet, #[case] expected: Specificity) {
        assert_eq!(a.compare(&b, &hierarchy()), expected);
    }

    #[test]
    fn exact_only_matches_itself() {
        let types = hierarchy();
        assert!(TypeSet::exact("Journal").matches(&"Journal".into(), &types));
        assert!(!TypeSet::exact("Journal").matches(&"Daily".into(), &types));
        assert!(TypeSet::subclass_of("Journal").matches(&"Daily".into(), &types));
        assert!(TypeSet::Any.matches(&"whatever".into(), &types));
    }

    #[test]
    fn closest_prefers_nearest_ancestor() {
        let types = hierarchy();
        let candidates = [TypeKey::object(), TypeKey::new("Tagged"), TypeKey::new("Journal")];
        let found = types.closest(&"Daily".into(), &candidates);
        assert_eq!(found, Some(&TypeKey::new("Journal")));
    }
}
