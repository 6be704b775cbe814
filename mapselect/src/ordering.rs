//! Source ordering and priority resolution.
//!
//! Selection priority follows the map's layer structure: layers drawn
//! later sit on top and rank higher. The structure is owned by the host
//! application and exposed through the [`LayerStructure`] trait so the
//! resolver always sees live layer add/remove. [`StaticStructure`] is a
//! self-contained implementation for tests and embeddings.

use crate::source::{FeatureSource, SourceId};
use std::sync::{Arc, RwLock};

/// Live view of the map's layer draw order.
pub trait LayerStructure: Send + Sync + 'static {
    /// Draw position of a source; higher values draw later (on top).
    ///
    /// Returns `None` when the source is not (or no longer) part of the
    /// structure. Positions form a total order, so ties are impossible.
    fn rank_of(&self, id: &SourceId) -> Option<u32>;
}

/// Fixed layer structure held in memory, top-most source first.
///
/// Supports live insertion and removal so tests can exercise structure
/// changes while queries are in flight.
#[derive(Debug, Default)]
pub struct StaticStructure {
    // index 0 = top-most
    order: RwLock<Vec<SourceId>>,
}

impl StaticStructure {
    /// Creates a structure from sources listed top-most first.
    pub fn new(top_down: Vec<SourceId>) -> Self {
        Self {
            order: RwLock::new(top_down),
        }
    }

    /// Inserts a source above all existing ones.
    pub fn insert_top(&self, id: SourceId) {
        if let Ok(mut order) = self.order.write() {
            order.insert(0, id);
        }
    }

    /// Removes a source from the structure.
    pub fn remove(&self, id: &SourceId) {
        if let Ok(mut order) = self.order.write() {
            order.retain(|s| s != id);
        }
    }
}

impl LayerStructure for StaticStructure {
    fn rank_of(&self, id: &SourceId) -> Option<u32> {
        let order = self.order.read().ok()?;
        let position = order.iter().position(|s| s == id)?;
        // Top-most gets the highest rank
        Some((order.len() - position) as u32)
    }
}

/// Resolves selection priority between sources.
#[derive(Clone)]
pub struct OrderingResolver {
    structure: Arc<dyn LayerStructure>,
}

impl OrderingResolver {
    /// Creates a resolver over the given layer structure.
    pub fn new(structure: Arc<dyn LayerStructure>) -> Self {
        Self { structure }
    }

    /// Returns the current rank of a source, if it is in the structure.
    pub fn rank_of(&self, id: &SourceId) -> Option<u32> {
        self.structure.rank_of(id)
    }

    /// Orders sources highest-priority first.
    ///
    /// Sources the structure cannot locate are excluded from the result;
    /// that is not an error.
    pub fn order(&self, sources: Vec<Arc<dyn FeatureSource>>) -> Vec<Arc<dyn FeatureSource>> {
        let mut ranked: Vec<(u32, Arc<dyn FeatureSource>)> = sources
            .into_iter()
            .filter_map(|s| self.structure.rank_of(&s.id()).map(|rank| (rank, s)))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.into_iter().map(|(_, s)| s).collect()
    }

    /// Returns true if `a` ranks strictly higher than `b`.
    ///
    /// A source missing from the structure never outranks one that is
    /// present.
    pub fn is_higher(&self, a: &SourceId, b: &SourceId) -> bool {
        match (self.structure.rank_of(a), self.structure.rank_of(b)) {
            (Some(ra), Some(rb)) => ra > rb,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Returns true if `candidate` ranks strictly higher than every source
    /// in `remaining`.
    ///
    /// An empty `remaining` set is vacuously dominated. Sources missing
    /// from the structure cannot outrank the candidate.
    pub fn is_top_among<'a>(
        &self,
        candidate: &SourceId,
        remaining: impl IntoIterator<Item = &'a SourceId>,
    ) -> bool {
        let Some(candidate_rank) = self.structure.rank_of(candidate) else {
            return false;
        };
        remaining
            .into_iter()
            .all(|other| match self.structure.rank_of(other) {
                Some(rank) => candidate_rank > rank,
                None => true,
            })
    }
}
