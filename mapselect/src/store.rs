//! Selection state events and the store contract.
//!
//! The engine mutates UI-visible selection state exclusively through
//! [`SelectionEvent`]s applied to a [`SelectionStore`]. Per operation the
//! contract is: one bulk [`SelectionEvent::Started`], then per affected
//! source exactly one terminal [`SelectionEvent::Ended`] or
//! [`SelectionEvent::Failed`]. [`SelectionEvent::Dropped`] clears a whole
//! set. The engine never reads the store back; it keeps its own
//! bookkeeping, so concurrent UI-driven reads can never race engine
//! decisions.
//!
//! [`MemoryStore`] is a reference implementation backed by a concurrent
//! map, suitable for tests and headless embeddings.

use crate::feature::{Feature, ObjectId};
use crate::source::{QueryError, SourceId};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a selection set: one named selection per map context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetKey {
    /// The owning map context.
    pub context: String,
    /// The selection set name within that context.
    pub name: String,
}

impl SetKey {
    /// Creates a set key.
    pub fn new(context: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context, self.name)
    }
}

/// Global counter for generating unique entry IDs.
static ENTRY_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a stored selection entry.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct EntryId(String);

impl EntryId {
    /// Creates an entry ID with the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated entry ID.
    pub fn auto() -> Self {
        let counter = ENTRY_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("entry-{}", counter))
    }

    /// Returns the string value of this entry ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of one (selection set, source) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// No entry exists for the source.
    Empty,
    /// A query is in flight for the source.
    Pending,
    /// The entry holds the source's selected features.
    Success,
    /// The source's last query failed.
    Failed,
}

/// Stored result for one (selection set, source) pair.
///
/// All features in one entry originate from exactly one source. An entry
/// with zero features is never stored; absence means empty.
#[derive(Debug, Clone)]
pub struct SelectionEntry {
    pub id: EntryId,
    pub source: SourceId,
    pub features: Vec<Feature>,
    pub status: EntryStatus,
}

impl SelectionEntry {
    /// Creates a successful entry with a fresh id.
    pub fn new(source: SourceId, features: Vec<Feature>) -> Self {
        Self {
            id: EntryId::auto(),
            source,
            features,
            status: EntryStatus::Success,
        }
    }

    /// Returns the number of selected features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the entry holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns the object ids of the selected features.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.features.iter().map(|f| f.id).collect()
    }
}

/// State transition emitted by the engine.
#[derive(Debug, Clone)]
pub enum SelectionEvent {
    /// An operation began for the listed sources; they are now pending.
    Started { sources: Vec<SourceId> },
    /// Terminal event: the source settled with the given entry snapshot
    /// (`None` clears the source's entry).
    Ended {
        source: SourceId,
        entry: Option<SelectionEntry>,
    },
    /// Terminal event: the source's query failed.
    Failed { source: SourceId, error: QueryError },
    /// The whole selection set was cleared.
    Dropped,
}

/// Sink for engine-emitted selection state transitions.
///
/// Implementations must apply each event atomically relative to
/// concurrent reads.
pub trait SelectionStore: Send + Sync + 'static {
    /// Applies one state transition for the given selection set.
    fn apply(&self, key: &SetKey, event: SelectionEvent);
}

/// Per-set state held by [`MemoryStore`].
#[derive(Debug, Default, Clone)]
struct SetState {
    pending: HashSet<SourceId>,
    entries: HashMap<SourceId, SelectionEntry>,
    failures: HashMap<SourceId, String>,
}

/// In-memory [`SelectionStore`].
///
/// Events mutate per-set state under the map's shard lock, so readers
/// always observe a whole transition.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: DashMap<SetKey, SetState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored entry for a source, if any.
    pub fn entry(&self, key: &SetKey, source: &SourceId) -> Option<SelectionEntry> {
        self.sets.get(key)?.entries.get(source).cloned()
    }

    /// Returns the features stored for a source.
    pub fn features(&self, key: &SetKey, source: &SourceId) -> Vec<Feature> {
        self.entry(key, source)
            .map(|e| e.features)
            .unwrap_or_default()
    }

    /// Returns the total number of features stored for a set.
    pub fn total(&self, key: &SetKey) -> usize {
        self.sets
            .get(key)
            .map(|s| s.entries.values().map(|e| e.len()).sum())
            .unwrap_or(0)
    }

    /// Returns the status of one (set, source) pair.
    pub fn status_of(&self, key: &SetKey, source: &SourceId) -> EntryStatus {
        let Some(state) = self.sets.get(key) else {
            return EntryStatus::Empty;
        };
        if state.pending.contains(source) {
            EntryStatus::Pending
        } else if state.failures.contains_key(source) {
            EntryStatus::Failed
        } else if state.entries.contains_key(source) {
            EntryStatus::Success
        } else {
            EntryStatus::Empty
        }
    }

    /// Returns the recorded failure message for a source, if any.
    pub fn failure_of(&self, key: &SetKey, source: &SourceId) -> Option<String> {
        self.sets.get(key)?.failures.get(source).cloned()
    }

    /// Returns the sources that currently hold entries.
    pub fn sources_with_entries(&self, key: &SetKey) -> Vec<SourceId> {
        self.sets
            .get(key)
            .map(|s| s.entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl SelectionStore for MemoryStore {
    fn apply(&self, key: &SetKey, event: SelectionEvent) {
        let mut state = self.sets.entry(key.clone()).or_default();
        match event {
            SelectionEvent::Started { sources } => {
                for source in sources {
                    state.failures.remove(&source);
                    state.pending.insert(source);
                }
            }
            SelectionEvent::Ended { source, entry } => {
                state.pending.remove(&source);
                state.failures.remove(&source);
                match entry {
                    Some(entry) => {
                        state.entries.insert(source, entry);
                    }
                    None => {
                        state.entries.remove(&source);
                    }
                }
            }
            SelectionEvent::Failed { source, error } => {
                state.pending.remove(&source);
                state.failures.insert(source, error.to_string());
            }
            SelectionEvent::Dropped => {
                state.pending.clear();
                state.entries.clear();
                state.failures.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;

    fn key() -> SetKey {
        SetKey::new("map", "default")
    }

    fn entry(source: &str, ids: &[u64]) -> SelectionEntry {
        SelectionEntry::new(
            SourceId::new(source),
            ids.iter().map(|id| Feature::point(*id, 0.0, 0.0)).collect(),
        )
    }

    #[test]
    fn test_set_key_display() {
        assert_eq!(format!("{}", key()), "map/default");
    }

    #[test]
    fn test_entry_id_auto_is_unique() {
        let a = EntryId::auto();
        let b = EntryId::auto();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("entry-"));
    }

    #[test]
    fn test_started_marks_pending() {
        let store = MemoryStore::new();
        let roads = SourceId::new("roads");

        store.apply(
            &key(),
            SelectionEvent::Started {
                sources: vec![roads.clone()],
            },
        );

        assert_eq!(store.status_of(&key(), &roads), EntryStatus::Pending);
    }

    #[test]
    fn test_ended_with_entry_stores_it() {
        let store = MemoryStore::new();
        let roads = SourceId::new("roads");

        store.apply(
            &key(),
            SelectionEvent::Ended {
                source: roads.clone(),
                entry: Some(entry("roads", &[1, 2, 3])),
            },
        );

        assert_eq!(store.status_of(&key(), &roads), EntryStatus::Success);
        assert_eq!(store.total(&key()), 3);
    }

    #[test]
    fn test_ended_with_none_clears_entry() {
        let store = MemoryStore::new();
        let roads = SourceId::new("roads");

        store.apply(
            &key(),
            SelectionEvent::Ended {
                source: roads.clone(),
                entry: Some(entry("roads", &[1])),
            },
        );
        store.apply(
            &key(),
            SelectionEvent::Ended {
                source: roads.clone(),
                entry: None,
            },
        );

        assert_eq!(store.status_of(&key(), &roads), EntryStatus::Empty);
        assert_eq!(store.total(&key()), 0);
    }

    #[test]
    fn test_failed_records_message() {
        let store = MemoryStore::new();
        let roads = SourceId::new("roads");

        store.apply(
            &key(),
            SelectionEvent::Failed {
                source: roads.clone(),
                error: QueryError::permanent("service unavailable"),
            },
        );

        assert_eq!(store.status_of(&key(), &roads), EntryStatus::Failed);
        assert_eq!(
            store.failure_of(&key(), &roads),
            Some("service unavailable".to_string())
        );
    }

    #[test]
    fn test_started_clears_previous_failure() {
        let store = MemoryStore::new();
        let roads = SourceId::new("roads");

        store.apply(
            &key(),
            SelectionEvent::Failed {
                source: roads.clone(),
                error: QueryError::retryable("timeout"),
            },
        );
        store.apply(
            &key(),
            SelectionEvent::Started {
                sources: vec![roads.clone()],
            },
        );

        assert_eq!(store.status_of(&key(), &roads), EntryStatus::Pending);
        assert!(store.failure_of(&key(), &roads).is_none());
    }

    #[test]
    fn test_dropped_clears_everything() {
        let store = MemoryStore::new();
        let roads = SourceId::new("roads");
        let parcels = SourceId::new("parcels");

        store.apply(
            &key(),
            SelectionEvent::Ended {
                source: roads.clone(),
                entry: Some(entry("roads", &[1, 2])),
            },
        );
        store.apply(
            &key(),
            SelectionEvent::Ended {
                source: parcels.clone(),
                entry: Some(entry("parcels", &[9])),
            },
        );
        store.apply(&key(), SelectionEvent::Dropped);

        assert_eq!(store.total(&key()), 0);
        assert!(store.sources_with_entries(&key()).is_empty());
    }

    #[test]
    fn test_sets_are_independent() {
        let store = MemoryStore::new();
        let other = SetKey::new("map", "other");
        let roads = SourceId::new("roads");

        store.apply(
            &key(),
            SelectionEvent::Ended {
                source: roads.clone(),
                entry: Some(entry("roads", &[1])),
            },
        );

        assert_eq!(store.total(&key()), 1);
        assert_eq!(store.total(&other), 0);
    }
}
