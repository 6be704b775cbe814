//! Geometry primitives and spatial predicates.
//!
//! Selection regions and feature geometries are deliberately minimal. The
//! engine only needs envelope derivation and a pluggable
//! [`GeometryComparator`] to decide whether a feature satisfies a spatial
//! predicate; exact geometry semantics (true polygon intersection,
//! projected distances) belong to the comparator implementation supplied
//! by the host application.

/// Broad geometry classification of a feature source.
///
/// Used to resolve per-source buffer distances when selecting with a
/// point region (clicking a thin line needs a tolerance, a polygon fill
/// does not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Point features (markers, labels).
    Point,
    /// Line features (roads, pipes).
    Polyline,
    /// Area features (parcels, footprints).
    Polygon,
}

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Envelope {
    /// Creates an envelope, normalizing swapped min/max coordinates.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin: xmin.min(xmax),
            ymin: ymin.min(ymax),
            xmax: xmin.max(xmax),
            ymax: ymin.max(ymax),
        }
    }

    /// Creates a degenerate envelope covering a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Returns this envelope grown by `distance` on every side.
    pub fn expand(&self, distance: f64) -> Self {
        Self::new(
            self.xmin - distance,
            self.ymin - distance,
            self.xmax + distance,
            self.ymax + distance,
        )
    }

    /// Returns true if this envelope overlaps `other` (edges touching count).
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.xmin <= other.xmax
            && self.xmax >= other.xmin
            && self.ymin <= other.ymax
            && self.ymax >= other.ymin
    }

    /// Returns true if `other` lies entirely within this envelope.
    pub fn contains(&self, other: &Envelope) -> bool {
        self.xmin <= other.xmin
            && self.xmax >= other.xmax
            && self.ymin <= other.ymin
            && self.ymax >= other.ymax
    }

    /// Returns the center point of this envelope.
    pub fn center(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }

    /// Returns the smallest envelope covering both this and `other`.
    pub fn union(&self, other: &Envelope) -> Self {
        Self::new(
            self.xmin.min(other.xmin),
            self.ymin.min(other.ymin),
            self.xmax.max(other.xmax),
            self.ymax.max(other.ymax),
        )
    }

    /// Returns true if all coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite() && self.ymin.is_finite() && self.xmax.is_finite() && self.ymax.is_finite()
    }
}

/// A feature or region geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single point.
    Point { x: f64, y: f64 },
    /// An open path of vertices.
    Polyline { path: Vec<(f64, f64)> },
    /// A closed ring of vertices.
    Polygon { ring: Vec<(f64, f64)> },
    /// A rectangular extent (e.g. a drag-box selection).
    Envelope(Envelope),
}

impl Geometry {
    /// Returns the broad classification of this geometry.
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point { .. } => GeometryKind::Point,
            Geometry::Polyline { .. } => GeometryKind::Polyline,
            Geometry::Polygon { .. } | Geometry::Envelope(_) => GeometryKind::Polygon,
        }
    }

    /// Returns the bounding envelope, or `None` for vertex-less geometries.
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            Geometry::Point { x, y } => Some(Envelope::point(*x, *y)),
            Geometry::Polyline { path } => envelope_of(path),
            Geometry::Polygon { ring } => envelope_of(ring),
            Geometry::Envelope(env) => Some(*env),
        }
    }
}

fn envelope_of(vertices: &[(f64, f64)]) -> Option<Envelope> {
    let (first, rest) = vertices.split_first()?;
    let mut env = Envelope::point(first.0, first.1);
    for (x, y) in rest {
        env = env.union(&Envelope::point(*x, *y));
    }
    Some(env)
}

/// Spatial relationship a feature must satisfy against the query region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicate {
    /// The feature geometry overlaps the region.
    Intersects,
    /// The feature geometry lies entirely within the region.
    Contains,
}

/// A selection region: geometry, predicate, and an optional buffer.
///
/// The buffer is resolved per source geometry kind from configuration when
/// the region is a point (see `EngineConfig::point_buffer_for`); callers
/// can also set it explicitly.
#[derive(Debug, Clone)]
pub struct QueryRegion {
    pub geometry: Geometry,
    pub predicate: SpatialPredicate,
    pub buffer: Option<f64>,
}

impl QueryRegion {
    /// Creates an unbuffered region.
    pub fn new(geometry: Geometry, predicate: SpatialPredicate) -> Self {
        Self {
            geometry,
            predicate,
            buffer: None,
        }
    }

    /// Sets an explicit buffer distance (builder pattern).
    pub fn with_buffer(mut self, buffer: f64) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Returns the region envelope expanded by the buffer, if any.
    pub fn buffered_envelope(&self) -> Option<Envelope> {
        let env = self.geometry.envelope()?;
        Some(match self.buffer {
            Some(d) => env.expand(d),
            None => env,
        })
    }
}

/// Decides whether a feature geometry satisfies a region's predicate.
///
/// The engine consults this for Reduce/Remove filtering and for the
/// re-selection check in Add. Host applications supply an implementation
/// backed by their mapping SDK; [`EnvelopeComparator`] is an
/// envelope-approximation default suitable for tests and simple embeddings.
pub trait GeometryComparator: Send + Sync + 'static {
    /// Returns true if `geometry` satisfies `region.predicate` against the
    /// buffered region.
    fn matches(&self, region: &QueryRegion, geometry: &Geometry) -> bool;
}

/// Envelope-based [`GeometryComparator`].
///
/// Approximates both region and feature by their bounding envelopes.
#[derive(Debug, Default, Clone)]
pub struct EnvelopeComparator;

impl GeometryComparator for EnvelopeComparator {
    fn matches(&self, region: &QueryRegion, geometry: &Geometry) -> bool {
        let (Some(r), Some(g)) = (region.buffered_envelope(), geometry.envelope()) else {
            return false;
        };
        match region.predicate {
            SpatialPredicate::Intersects => r.intersects(&g),
            SpatialPredicate::Contains => r.contains(&g),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_normalizes_swapped_bounds() {
        let env = Envelope::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(env.xmin, 0.0);
        assert_eq!(env.ymin, 5.0);
        assert_eq!(env.xmax, 10.0);
        assert_eq!(env.ymax, 20.0);
    }

    #[test]
    fn test_envelope_intersects() {
        let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
        let b = Envelope::new(5.0, 5.0, 15.0, 15.0);
        let c = Envelope::new(11.0, 11.0, 20.0, 20.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));

        // Touching edges count as intersecting
        let d = Envelope::new(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(&d));
    }

    #[test]
    fn test_envelope_contains() {
        let outer = Envelope::new(0.0, 0.0, 10.0, 10.0);
        let inner = Envelope::new(2.0, 2.0, 8.0, 8.0);
        let partial = Envelope::new(5.0, 5.0, 15.0, 15.0);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&partial));
    }

    #[test]
    fn test_envelope_expand_and_center() {
        let env = Envelope::new(0.0, 0.0, 10.0, 20.0);
        let grown = env.expand(5.0);
        assert_eq!(grown.xmin, -5.0);
        assert_eq!(grown.ymax, 25.0);
        assert_eq!(env.center(), (5.0, 10.0));
    }

    #[test]
    fn test_geometry_envelope() {
        let line = Geometry::Polyline {
            path: vec![(0.0, 0.0), (10.0, 5.0), (-3.0, 2.0)],
        };
        let env = line.envelope().unwrap();
        assert_eq!(env.xmin, -3.0);
        assert_eq!(env.xmax, 10.0);
        assert_eq!(env.ymax, 5.0);
    }

    #[test]
    fn test_empty_geometry_has_no_envelope() {
        let empty = Geometry::Polyline { path: vec![] };
        assert!(empty.envelope().is_none());
    }

    #[test]
    fn test_geometry_kind() {
        assert_eq!(Geometry::Point { x: 0.0, y: 0.0 }.kind(), GeometryKind::Point);
        assert_eq!(
            Geometry::Envelope(Envelope::point(0.0, 0.0)).kind(),
            GeometryKind::Polygon
        );
    }

    #[test]
    fn test_buffered_envelope() {
        let region = QueryRegion::new(
            Geometry::Point { x: 5.0, y: 5.0 },
            SpatialPredicate::Intersects,
        )
        .with_buffer(2.0);

        let env = region.buffered_envelope().unwrap();
        assert_eq!(env.xmin, 3.0);
        assert_eq!(env.xmax, 7.0);
    }

    #[test]
    fn test_envelope_comparator_intersects() {
        let region = QueryRegion::new(
            Geometry::Envelope(Envelope::new(0.0, 0.0, 10.0, 10.0)),
            SpatialPredicate::Intersects,
        );
        let comparator = EnvelopeComparator;

        assert!(comparator.matches(&region, &Geometry::Point { x: 5.0, y: 5.0 }));
        assert!(!comparator.matches(&region, &Geometry::Point { x: 50.0, y: 50.0 }));
    }

    #[test]
    fn test_envelope_comparator_contains() {
        let region = QueryRegion::new(
            Geometry::Envelope(Envelope::new(0.0, 0.0, 10.0, 10.0)),
            SpatialPredicate::Contains,
        );
        let comparator = EnvelopeComparator;

        let inside = Geometry::Polyline {
            path: vec![(1.0, 1.0), (9.0, 9.0)],
        };
        let straddling = Geometry::Polyline {
            path: vec![(5.0, 5.0), (15.0, 5.0)],
        };

        assert!(comparator.matches(&region, &inside));
        assert!(!comparator.matches(&region, &straddling));
    }

    #[test]
    fn test_comparator_rejects_empty_geometry() {
        let region = QueryRegion::new(
            Geometry::Envelope(Envelope::new(0.0, 0.0, 10.0, 10.0)),
            SpatialPredicate::Intersects,
        );
        let empty = Geometry::Polygon { ring: vec![] };
        assert!(!EnvelopeComparator.matches(&region, &empty));
    }
}
