//! Queryable feature sources.
//!
//! A [`FeatureSource`] is the engine's view of a map layer: something with
//! a stable identity that can be queried by region and supports cooperative
//! cancellation. The remote transport behind a query is opaque to the
//! engine; [`MemorySource`] is an in-memory implementation for tests and
//! simple embeddings.

use crate::feature::{Feature, ObjectId};
use crate::geometry::{EnvelopeComparator, GeometryComparator, GeometryKind, QueryRegion};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Stable identity of a feature source.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a source id with the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string value of this source id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Parameters of one per-source query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// The selection region (buffer already resolved by the engine).
    pub region: QueryRegion,

    /// Object ids the source must not return (already-selected features,
    /// used by Add to merge instead of duplicate).
    pub exclude: Vec<ObjectId>,

    /// Maximum number of features to return.
    pub limit: Option<usize>,
}

impl QuerySpec {
    /// Creates a spec with no exclusions and no limit.
    pub fn new(region: QueryRegion) -> Self {
        Self {
            region,
            exclude: Vec::new(),
            limit: None,
        }
    }

    /// Sets the excluded object ids (builder pattern).
    pub fn with_exclusions(mut self, exclude: Vec<ObjectId>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Sets the result limit (builder pattern).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Error from a per-source query.
#[derive(Debug, Clone)]
pub struct QueryError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is retryable (transient) or permanent.
    pub is_retryable: bool,
}

impl QueryError {
    /// Creates a retryable error (transient failure like a network timeout).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }

    /// Creates a permanent error (won't succeed on retry).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }

    /// Creates the error used when a query exceeds the configured timeout.
    pub fn timed_out(after: std::time::Duration) -> Self {
        Self::retryable(format!("query timed out after {:?}", after))
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for QueryError {}

/// Boxed future returned by [`FeatureSource::query`].
pub type QueryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Feature>, QueryError>> + Send + 'a>>;

/// A queryable map layer participating in selection.
///
/// Implementations wrap whatever transport serves the layer's features
/// (remote feature service, local geodatabase, in-memory collection). The
/// query must be cooperatively cancellable: when `cancel` fires, the
/// implementation should stop work promptly; the engine treats the
/// source as an empty contribution either way.
pub trait FeatureSource: Send + Sync + 'static {
    /// Returns the stable identity of this source.
    fn id(&self) -> SourceId;

    /// Returns a human-readable name for logging.
    fn name(&self) -> &str;

    /// Returns the broad geometry classification of this source's features.
    fn geometry_kind(&self) -> GeometryKind;

    /// Returns true if the layer is currently visible on the map.
    fn is_visible(&self) -> bool {
        true
    }

    /// Returns true if the layer allows interactive selection.
    fn is_selectable(&self) -> bool {
        true
    }

    /// Queries features matching the spec's region and predicate.
    ///
    /// Features tagged with ids in `spec.exclude` must not be returned.
    fn query(&self, spec: QuerySpec, cancel: CancellationToken) -> QueryFuture<'_>;
}

/// In-memory [`FeatureSource`] backed by a feature list.
///
/// Matching uses envelope approximation. Intended for tests, demos, and
/// embeddings that hold their data locally.
pub struct MemorySource {
    id: SourceId,
    name: String,
    kind: GeometryKind,
    visible: bool,
    selectable: bool,
    features: Vec<Feature>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new(id: impl Into<SourceId>, kind: GeometryKind) -> Self {
        let id = id.into();
        let name = id.as_str().to_string();
        Self {
            id,
            name,
            kind,
            visible: true,
            selectable: true,
            features: Vec::new(),
        }
    }

    /// Sets the feature list (builder pattern).
    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// Marks the layer as hidden (builder pattern).
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Marks the layer as non-selectable (builder pattern).
    pub fn unselectable(mut self) -> Self {
        self.selectable = false;
        self
    }
}

impl FeatureSource for MemorySource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn geometry_kind(&self) -> GeometryKind {
        self.kind
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn is_selectable(&self) -> bool {
        self.selectable
    }

    fn query(&self, spec: QuerySpec, cancel: CancellationToken) -> QueryFuture<'_> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            let comparator = EnvelopeComparator;
            let mut matched: Vec<Feature> = self
                .features
                .iter()
                .filter(|f| !spec.exclude.contains(&f.id))
                .filter(|f| comparator.matches(&spec.region, &f.geometry))
                .cloned()
                .collect();
            if let Some(limit) = spec.limit {
                matched.truncate(limit);
            }
            Ok(matched)
        })
    }
}
