use std::fmt;

use crate::error::{ConvertError, ConvertResult};
use crate::types::{Specificity, TypeHierarchy, TypeSet};

/// Conversion intent: which values (`source`) should become what (`destination`).
///
/// Equality is structural. The default metamorphosis is `* -> *` and acts as a
/// catch-all during matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metamorphosis {
    pub source: TypeSet,
    pub destination: TypeSet,
}

impl Default for Metamorphosis {
    fn default() -> Self {
        Self {
            source: TypeSet::Any,
            destination: TypeSet::Any,
        }
    }
}

impl Metamorphosis {
    pub fn new(source: TypeSet, destination: TypeSet) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// `true` if a converter registered for `self` can carry out `request`:
    /// both of its patterns cover the requested ones.
    pub fn admits(&self, request: &Metamorphosis, types: &TypeHierarchy) -> bool {
        self.source.contains(&request.source, types)
            && self.destination.contains(&request.destination, types)
    }

    /// Source specificity decides first, destination specificity breaks ties.
    fn dominates(&self, other: &Metamorphosis, types: &TypeHierarchy) -> bool {
        match self.source.compare(&other.source, types) {
            Specificity::MoreSpecific => true,
            Specificity::Equal => {
                self.destination.compare(&other.destination, types) == Specificity::MoreSpecific
            }
            Specificity::LessSpecific | Specificity::Incomparable => false,
        }
    }

    /// Pick, among `candidates`, the most specific one that admits `self`.
    ///
    /// Fails with `NoConverterFound` when nothing admits the request and with
    /// `AmbiguousConversion` when more than one admitted candidate is left
    /// undominated.
    pub fn pick_closest<'a, I>(&self, candidates: I, types: &TypeHierarchy) -> ConvertResult<&'a Metamorphosis>
    where
        I: IntoIterator<Item = &'a Metamorphosis>,
    {
        let admitted: Vec<&Metamorphosis> = candidates
            .into_iter()
            .filter(|c| c.admits(self, types))
            .collect();

        let best: Vec<&Metamorphosis> = admitted
            .iter()
            .copied()
            .filter(|c| !admitted.iter().any(|other| other.dominates(c, types)))
            .collect();

        match best.as_slice() {
            [] => Err(ConvertError::no_converter(self.clone())),
            [single] => Ok(single),
            several => Err(ConvertError::ambiguous(
                self.clone(),
                several.iter().map(|mm| (*mm).clone()).collect(),
            )),
        }
    }
}

impl fmt::Display for Metamorphosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}
