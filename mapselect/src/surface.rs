//! Post-selection surfacing: popups and viewport fits.
//!
//! Purely advisory. The engine hands the final feature list to a
//! [`ResultSurfacer`] after a New/Add completes; implementations display
//! a popup or zoom the map, and their failures are ignored.

use crate::feature::Feature;
use crate::store::SetKey;

/// Receives the final features of a completed selection for display.
pub trait ResultSurfacer: Send + Sync + 'static {
    /// Shows a popup for the selected features.
    ///
    /// `anchor` is a representative location (the center of the features'
    /// combined extent) when one could be computed.
    fn show_popup(&self, key: &SetKey, features: &[Feature], anchor: Option<(f64, f64)>);

    /// Requests a viewport fit over the selected features.
    fn fit_viewport(&self, key: &SetKey, features: &[Feature]);
}

/// [`ResultSurfacer`] that does nothing.
#[derive(Debug, Default, Clone)]
pub struct NullSurfacer;

impl ResultSurfacer for NullSurfacer {
    fn show_popup(&self, _key: &SetKey, _features: &[Feature], _anchor: Option<(f64, f64)>) {}

    fn fit_viewport(&self, _key: &SetKey, _features: &[Feature]) {}
}
