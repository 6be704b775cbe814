//! Selection engine - the core orchestrator for graphical feature selection.
//!
//! The [`SelectionEngine`] coordinates selection across many map layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SelectionEngine                         │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐  │
//! │  │ Ordering     │  │ Capacity      │  │ Per-set          │  │
//! │  │ Resolver     │  │ Limiter       │  │ bookkeeping      │  │
//! │  └──────────────┘  └───────────────┘  └──────────────────┘  │
//! │          │                 │                   │             │
//! │          ▼                 ▼                   ▼             │
//! │  fan out one cancellable query per source, settle through   │
//! │  an mpsc channel, resolve the top-only race, emit events    │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                   │
//!              ▼                                   ▼
//!      FeatureSource::query                 SelectionStore::apply
//! ```
//!
//! # Operations
//!
//! - [`SelectionEngine::select_new`] - replace prior entries with the
//!   query result
//! - [`SelectionEngine::select_add`] - merge new features into existing
//!   entries
//! - [`SelectionEngine::reduce`] - keep only existing features matching
//!   the region
//! - [`SelectionEngine::remove`] - discard existing features matching
//!   the region
//! - [`SelectionEngine::clear`] - drop a whole selection set
//!
//! New and Add fan out one cancellable query per source and share a
//! single cancellation token per call; settlements flow through a
//! channel into a coordinator that owns the top-only race state, so the
//! "current best" pointer has a single writer. Reduce and Remove are
//! ordered filters over existing entries and never hit the network.
//!
//! # Event contract
//!
//! Every operation emits one bulk `Started`, then per affected source
//! exactly one terminal `Ended` or `Failed`. Cancelled sources settle as
//! empty contributions (`Ended`), never as failures.

mod fanout;
mod filter;
mod race;

use crate::capacity::{CapacityLimiter, CapacityNotifier};
use crate::config::{DisplayColor, EngineConfig};
use crate::geometry::{GeometryComparator, QueryRegion};
use crate::ordering::{LayerStructure, OrderingResolver};
use crate::set::SelectionSet;
use crate::source::{FeatureSource, SourceId};
use crate::store::{SelectionEvent, SelectionStore, SetKey};
use crate::surface::ResultSurfacer;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub use fanout::QueryMode;
pub use filter::FilterMode;

/// Errors that abort an operation before any query is started.
///
/// Per-source query failures are not represented here; they surface as
/// `Failed` events and never abort sibling queries.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The engine configuration cannot support the operation.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The query region is unusable.
    #[error("invalid query region: {0}")]
    InvalidRegion(String),
}

/// Per-operation behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationOptions {
    /// Only the highest-priority source with a qualifying result ends up
    /// selected.
    pub top_only: bool,
    /// Skip sources whose layer is hidden.
    pub visible_only: bool,
    /// Skip sources whose layer forbids interactive selection.
    pub selectable_only: bool,
    /// Surface the final features in a popup when the operation completes.
    pub show_popup: bool,
}

/// Result of one engine operation.
#[derive(Debug, Clone, Default)]
pub struct OperationSummary {
    /// Sources the operation actually worked on, highest priority first.
    pub queried: Vec<SourceId>,
    /// The source that won a top-only race, or consumed a top-only
    /// Reduce/Remove.
    pub winner: Option<SourceId>,
    /// Total features selected in the set after the operation.
    pub total_selected: usize,
    /// True if the record cap truncated this operation's results.
    pub truncated: bool,
    /// Number of sources whose query failed.
    pub failed_sources: usize,
}

/// Collaborators the engine is constructed from.
///
/// Explicit context instead of globals: the store handle, the live layer
/// structure, and the optional comparator/notifier/surfacer overrides
/// are threaded through the constructor.
pub struct EngineDeps {
    pub store: Arc<dyn SelectionStore>,
    pub structure: Arc<dyn LayerStructure>,
    pub comparator: Arc<dyn GeometryComparator>,
    pub notifier: Arc<dyn CapacityNotifier>,
    pub surfacer: Arc<dyn ResultSurfacer>,
}

impl EngineDeps {
    /// Creates dependencies with default comparator, notifier, and
    /// surfacer implementations.
    pub fn new(store: Arc<dyn SelectionStore>, structure: Arc<dyn LayerStructure>) -> Self {
        Self {
            store,
            structure,
            comparator: Arc::new(crate::geometry::EnvelopeComparator),
            notifier: Arc::new(crate::capacity::NullNotifier),
            surfacer: Arc::new(crate::surface::NullSurfacer),
        }
    }

    /// Sets the geometry comparator (builder pattern).
    pub fn with_comparator(mut self, comparator: Arc<dyn GeometryComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Sets the capacity-exceeded notifier (builder pattern).
    pub fn with_notifier(mut self, notifier: Arc<dyn CapacityNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the popup/viewport surfacer (builder pattern).
    pub fn with_surfacer(mut self, surfacer: Arc<dyn ResultSurfacer>) -> Self {
        self.surfacer = surfacer;
        self
    }
}

/// Coordinates graphical feature selection across map layers.
///
/// One engine serves any number of selection sets; operations on the
/// same set are serialized, operations on different sets run freely in
/// parallel.
pub struct SelectionEngine {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn SelectionStore>,
    pub(crate) resolver: OrderingResolver,
    pub(crate) comparator: Arc<dyn GeometryComparator>,
    pub(crate) notifier: Arc<dyn CapacityNotifier>,
    pub(crate) surfacer: Arc<dyn ResultSurfacer>,
    pub(crate) limiter: Arc<CapacityLimiter>,
    sets: DashMap<SetKey, Arc<Mutex<SelectionSet>>>,
}

impl SelectionEngine {
    /// Creates an engine from configuration and collaborators.
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        Self {
            config,
            store: deps.store,
            resolver: OrderingResolver::new(deps.structure),
            comparator: deps.comparator,
            notifier: deps.notifier,
            surfacer: deps.surfacer,
            limiter: Arc::new(CapacityLimiter::new()),
            sets: DashMap::new(),
        }
    }

    /// Replaces the selection for the given sources with the query result.
    pub async fn select_new(
        &self,
        key: &SetKey,
        region: QueryRegion,
        sources: Vec<Arc<dyn FeatureSource>>,
        options: OperationOptions,
    ) -> Result<OperationSummary, SelectionError> {
        fanout::run(self, key, region, sources, options, QueryMode::Replace).await
    }

    /// Merges the query result into the existing selection.
    ///
    /// Queries exclude object ids already selected per source, so
    /// re-selecting a feature never duplicates it.
    pub async fn select_add(
        &self,
        key: &SetKey,
        region: QueryRegion,
        sources: Vec<Arc<dyn FeatureSource>>,
        options: OperationOptions,
    ) -> Result<OperationSummary, SelectionError> {
        fanout::run(self, key, region, sources, options, QueryMode::Merge).await
    }

    /// Keeps only the already-selected features that match the region.
    pub async fn reduce(
        &self,
        key: &SetKey,
        region: QueryRegion,
        sources: Vec<Arc<dyn FeatureSource>>,
        options: OperationOptions,
    ) -> Result<OperationSummary, SelectionError> {
        filter::run(self, key, region, sources, options, FilterMode::Intersect).await
    }

    /// Discards the already-selected features that match the region.
    pub async fn remove(
        &self,
        key: &SetKey,
        region: QueryRegion,
        sources: Vec<Arc<dyn FeatureSource>>,
        options: OperationOptions,
    ) -> Result<OperationSummary, SelectionError> {
        filter::run(self, key, region, sources, options, FilterMode::Subtract).await
    }

    /// Clears a whole selection set.
    pub async fn clear(&self, key: &SetKey) {
        let state = self.set_state(key);
        let mut set = state.lock().await;
        let removed = set.clear();
        self.limiter.reset(key);
        self.store.apply(key, SelectionEvent::Dropped);
        debug!(set = %key, removed, "selection set cleared");
    }

    /// Tears down every selection set belonging to a map context.
    pub async fn dispose_context(&self, context: &str) {
        let keys: Vec<SetKey> = self
            .sets
            .iter()
            .filter(|entry| entry.key().context == context)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            self.clear(&key).await;
            self.sets.remove(&key);
        }
    }

    /// Returns the number of features currently selected in a set.
    pub async fn selected_count(&self, key: &SetKey) -> usize {
        self.set_state(key).lock().await.total_selected()
    }

    /// Returns the set's display color, resolving it lazily on first use.
    pub async fn set_color(&self, key: &SetKey) -> DisplayColor {
        self.set_state(key)
            .lock()
            .await
            .color_or_assign(&self.config.palette)
    }

    pub(crate) fn set_state(&self, key: &SetKey) -> Arc<Mutex<SelectionSet>> {
        self.sets
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SelectionSet::new(
                    key.clone(),
                    self.config.max_record_count,
                )))
            })
            .clone()
    }

    /// Validates configuration and region before any query starts.
    ///
    /// A failure here aborts the whole operation with no partial event
    /// emission.
    pub(crate) fn validate_region(&self, region: &QueryRegion) -> Result<(), SelectionError> {
        if self.config.max_record_count == 0 {
            return Err(SelectionError::Configuration(
                "max_record_count must be non-zero".to_string(),
            ));
        }
        match region.geometry.envelope() {
            None => Err(SelectionError::InvalidRegion(
                "geometry has no extent".to_string(),
            )),
            Some(env) if !env.is_finite() => Err(SelectionError::InvalidRegion(
                "geometry has non-finite coordinates".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }
}
