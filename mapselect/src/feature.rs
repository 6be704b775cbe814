//! Feature records.

use crate::geometry::Geometry;
use std::fmt;

/// Stable identifier of a feature within its source.
///
/// Dedup identity across the whole selection is (source, object id);
/// object ids are only unique within one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Creates an object id from its numeric value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A selectable record: an object id plus a geometry.
///
/// Attribute values are a host-application concern and are not carried
/// through the selection engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: ObjectId,
    pub geometry: Geometry,
}

impl Feature {
    /// Creates a feature.
    pub fn new(id: impl Into<ObjectId>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
        }
    }

    /// Creates a point feature (convenience for tests and demos).
    pub fn point(id: u64, x: f64, y: f64) -> Self {
        Self::new(id, Geometry::Point { x, y })
    }
}
