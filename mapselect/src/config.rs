//! Engine configuration.
//!
//! Groups the tunables of the selection engine: the per-set record cap,
//! point-selection buffer distances per source geometry kind, the display
//! color palette, auto-zoom, and the optional per-source query timeout.

use crate::geometry::GeometryKind;
use std::collections::HashMap;
use std::time::Duration;

/// Default maximum selected-feature count per selection set.
pub const DEFAULT_MAX_RECORD_COUNT: usize = 1000;

/// Default buffer distance (map units) applied to point regions when
/// selecting from point or line sources.
pub const DEFAULT_POINT_BUFFER: f64 = 6.0;

/// RGB display color for selection highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl DisplayColor {
    /// Creates a color from RGB components.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Default selection color palette, cycled across selection sets.
pub const DEFAULT_PALETTE: [DisplayColor; 6] = [
    DisplayColor::new(0, 255, 255),  // cyan
    DisplayColor::new(255, 255, 0),  // yellow
    DisplayColor::new(255, 0, 255),  // magenta
    DisplayColor::new(0, 255, 0),    // green
    DisplayColor::new(255, 128, 0),  // orange
    DisplayColor::new(128, 128, 255),// periwinkle
];

/// Configuration for the selection engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum total features per selection set; exceeding batches are
    /// truncated.
    pub max_record_count: usize,

    /// Request a viewport fit over the final features after New/Add.
    pub auto_zoom: bool,

    /// Per-source query timeout. `None` (the default) imposes none: a
    /// stuck query blocks only its own source's contribution.
    pub query_timeout: Option<Duration>,

    /// Buffer distance applied to point regions, keyed by the queried
    /// source's geometry kind.
    pub point_buffers: HashMap<GeometryKind, f64>,

    /// Palette from which selection sets lazily resolve their color.
    pub palette: Vec<DisplayColor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut point_buffers = HashMap::new();
        point_buffers.insert(GeometryKind::Point, DEFAULT_POINT_BUFFER);
        point_buffers.insert(GeometryKind::Polyline, DEFAULT_POINT_BUFFER);

        Self {
            max_record_count: DEFAULT_MAX_RECORD_COUNT,
            auto_zoom: false,
            query_timeout: None,
            point_buffers,
            palette: DEFAULT_PALETTE.to_vec(),
        }
    }
}

impl EngineConfig {
    /// Sets the per-set record cap (builder pattern).
    pub fn with_max_record_count(mut self, max_record_count: usize) -> Self {
        self.max_record_count = max_record_count;
        self
    }

    /// Enables or disables auto-zoom (builder pattern).
    pub fn with_auto_zoom(mut self, auto_zoom: bool) -> Self {
        self.auto_zoom = auto_zoom;
        self
    }

    /// Sets the per-source query timeout (builder pattern).
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Sets the point-region buffer for one geometry kind (builder pattern).
    pub fn with_point_buffer(mut self, kind: GeometryKind, distance: f64) -> Self {
        self.point_buffers.insert(kind, distance);
        self
    }

    /// Returns the point-region buffer for a source geometry kind.
    pub fn point_buffer_for(&self, kind: GeometryKind) -> Option<f64> {
        self.point_buffers.get(&kind).copied()
    }
}
