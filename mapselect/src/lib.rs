//! MapSelect - graphical feature selection for map authoring tools.
//!
//! This library implements the selection engine that coordinates spatial
//! feature selection across many map layers: concurrent per-layer queries,
//! top-only race resolution, capacity enforcement, and cancellation.
//!
//! # High-Level API
//!
//! The [`engine`] module provides the main entry point:
//!
//! ```ignore
//! use mapselect::engine::{SelectionEngine, EngineDeps, OperationOptions};
//! use mapselect::config::EngineConfig;
//! use mapselect::geometry::{Geometry, QueryRegion, SpatialPredicate};
//! use mapselect::store::SetKey;
//!
//! let engine = SelectionEngine::new(EngineConfig::default(), deps);
//! let key = SetKey::new("map-1", "default");
//!
//! let region = QueryRegion::new(
//!     Geometry::Point { x: -122.3, y: 47.6 },
//!     SpatialPredicate::Intersects,
//! );
//!
//! let summary = engine
//!     .select_new(&key, region, sources, OperationOptions::default())
//!     .await?;
//! ```
//!
//! Layer ordering, geometry comparison, state storage, and notification
//! display are host-application concerns; they plug in through the traits
//! in [`ordering`], [`geometry`], [`store`], [`capacity`], and [`surface`].

pub mod capacity;
pub mod config;
pub mod engine;
pub mod feature;
pub mod geometry;
pub mod logging;
pub mod ordering;
pub mod source;
pub mod store;
pub mod surface;

mod set;

/// Version of the MapSelect library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
