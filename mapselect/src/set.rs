//! Engine-side selection set bookkeeping.
//!
//! The engine keeps its own authoritative copy of every set's entries so
//! operation decisions never read the external store back. Empty entries
//! are never stored; absence means empty.

use crate::config::DisplayColor;
use crate::feature::ObjectId;
use crate::source::SourceId;
use crate::store::{SelectionEntry, SetKey};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

pub(crate) struct SelectionSet {
    key: SetKey,
    max_record_count: usize,
    color: Option<DisplayColor>,
    entries: HashMap<SourceId, SelectionEntry>,
}

impl SelectionSet {
    pub(crate) fn new(key: SetKey, max_record_count: usize) -> Self {
        Self {
            key,
            max_record_count,
            color: None,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn key(&self) -> &SetKey {
        &self.key
    }

    pub(crate) fn max_record_count(&self) -> usize {
        self.max_record_count
    }

    pub(crate) fn total_selected(&self) -> usize {
        self.entries.values().map(|e| e.len()).sum()
    }

    pub(crate) fn entry(&self, source: &SourceId) -> Option<&SelectionEntry> {
        self.entries.get(source)
    }

    pub(crate) fn object_ids(&self, source: &SourceId) -> Vec<ObjectId> {
        self.entries
            .get(source)
            .map(|e| e.object_ids())
            .unwrap_or_default()
    }

    pub(crate) fn take_entry(&mut self, source: &SourceId) -> Option<SelectionEntry> {
        self.entries.remove(source)
    }

    pub(crate) fn put_entry(&mut self, entry: SelectionEntry) {
        debug_assert!(!entry.is_empty(), "empty entries must not be stored");
        self.entries.insert(entry.source.clone(), entry);
    }

    /// Removes a source's entry, returning how many features it held.
    pub(crate) fn remove_entry(&mut self, source: &SourceId) -> usize {
        self.entries.remove(source).map(|e| e.len()).unwrap_or(0)
    }

    /// Clears all entries, returning how many features were held.
    pub(crate) fn clear(&mut self) -> usize {
        let total = self.total_selected();
        self.entries.clear();
        total
    }

    pub(crate) fn sources_with_entries(&self) -> Vec<SourceId> {
        self.entries.keys().cloned().collect()
    }

    /// Returns the set's display color, resolving it lazily from the
    /// palette on first access. The choice is stable per key.
    pub(crate) fn color_or_assign(&mut self, palette: &[DisplayColor]) -> DisplayColor {
        if let Some(color) = self.color {
            return color;
        }
        let color = if palette.is_empty() {
            crate::config::DEFAULT_PALETTE[0]
        } else {
            let mut hasher = DefaultHasher::new();
            self.key.hash(&mut hasher);
            palette[(hasher.finish() as usize) % palette.len()]
        };
        self.color = Some(color);
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PALETTE;
    use crate::feature::Feature;

    fn set() -> SelectionSet {
        SelectionSet::new(SetKey::new("map", "default"), 1000)
    }

    fn entry(source: &str, ids: &[u64]) -> SelectionEntry {
        SelectionEntry::new(
            SourceId::new(source),
            ids.iter().map(|id| Feature::point(*id, 0.0, 0.0)).collect(),
        )
    }

    #[test]
    fn test_totals_and_removal() {
        let mut s = set();
        s.put_entry(entry("roads", &[1, 2, 3]));
        s.put_entry(entry("parcels", &[7]));

        assert_eq!(s.total_selected(), 4);
        assert_eq!(s.object_ids(&SourceId::new("roads")).len(), 3);

        assert_eq!(s.remove_entry(&SourceId::new("roads")), 3);
        assert_eq!(s.total_selected(), 1);
        assert_eq!(s.remove_entry(&SourceId::new("roads")), 0);
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let mut s = set();
        s.put_entry(entry("roads", &[1, 2]));
        s.put_entry(entry("roads", &[9]));

        assert_eq!(s.total_selected(), 1);
        assert_eq!(
            s.object_ids(&SourceId::new("roads")),
            vec![crate::feature::ObjectId::new(9)]
        );
    }

    #[test]
    fn test_clear_reports_removed_count() {
        let mut s = set();
        s.put_entry(entry("roads", &[1, 2]));
        assert_eq!(s.clear(), 2);
        assert_eq!(s.total_selected(), 0);
        assert!(s.sources_with_entries().is_empty());
    }

    #[test]
    fn test_color_is_lazy_and_stable() {
        let mut s = set();
        let first = s.color_or_assign(&DEFAULT_PALETTE);
        let second = s.color_or_assign(&DEFAULT_PALETTE);
        assert_eq!(first, second);

        // Same key resolves to the same palette slot in a fresh set
        let mut again = set();
        assert_eq!(again.color_or_assign(&DEFAULT_PALETTE), first);
    }
}
