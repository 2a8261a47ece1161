use std::collections::HashMap;
use std::sync::Arc;

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::metamorphosis::Metamorphosis;
use morph_api::value::Record;

use crate::registry::Snapshot;

/// Resolution memo key: the request plus the local registrations in scope.
type MemoKey = (Metamorphosis, Vec<Metamorphosis>);

/// State of one top-level conversion.
///
/// Holds the registry snapshot taken when the conversion started, so
/// registrations made meanwhile never change the outcome of a running tree.
#[derive(Debug, Clone)]
pub struct Context {
    snapshot: Arc<Snapshot>,
    memo: HashMap<MemoKey, Metamorphosis>,
    /// Records currently being decomposed, outermost first.
    in_progress: Vec<usize>,
    max_depth: usize,
    parallel_threshold: usize,
}

impl Context {
    pub fn new(snapshot: Arc<Snapshot>, max_depth: usize, parallel_threshold: usize) -> Self {
        Self {
            snapshot,
            memo: HashMap::new(),
            in_progress: Vec::new(),
            max_depth,
            parallel_threshold,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(max_depth: usize) -> Self {
        Self::new(Arc::new(Snapshot::default()), max_depth, usize::MAX)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    pub(crate) fn memoized(&self, key: &MemoKey) -> Option<&Metamorphosis> {
        self.memo.get(key)
    }

    pub(crate) fn memoize(&mut self, key: MemoKey, chosen: Metamorphosis) {
        self.memo.insert(key, chosen);
    }

    /// Mark `record` as being decomposed. Fails if it already is, which means
    /// the structure loops back onto itself.
    pub(crate) fn enter(&mut self, record: &Record) -> ConvertResult<()> {
        let id = record.id();
        if self.in_progress.contains(&id) {
            return Err(ConvertError::cyclic(record.type_key()));
        }
        self.in_progress.push(id);
        Ok(())
    }

    pub(crate) fn leave(&mut self, record: &Record) {
        let id = record.id();
        if let Some(pos) = self.in_progress.iter().rposition(|r| *r == id) {
            self.in_progress.remove(pos);
        }
    }

    /// Independent copy for converting a sibling on another thread. Shares
    /// the snapshot and the records in progress above the fork point.
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    pub(crate) fn fork(&self) -> Self {
        self.clone()
    }
}
