//! Reduce/Remove: ordered filtering of existing entries.
//!
//! Unlike New/Add these never query the network. They walk the sources
//! that already hold entries in priority order and filter each entry's
//! features through the geometry comparator. Top-only mode is consumed
//! by the first source that produces a qualifying outcome: Reduce drops
//! every later entry outright, Remove leaves every later entry
//! untouched.

use super::{OperationOptions, OperationSummary, SelectionError, SelectionEngine};
use crate::feature::Feature;
use crate::geometry::QueryRegion;
use crate::source::{FeatureSource, SourceId};
use crate::store::{SelectionEvent, SetKey};
use std::sync::Arc;
use tracing::debug;

/// How the region filter applies to existing features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep features matching the region (Reduce).
    Intersect,
    /// Discard features matching the region (Remove).
    Subtract,
}

pub(super) async fn run(
    engine: &SelectionEngine,
    key: &SetKey,
    region: QueryRegion,
    sources: Vec<Arc<dyn FeatureSource>>,
    options: OperationOptions,
    mode: FilterMode,
) -> Result<OperationSummary, SelectionError> {
    engine.validate_region(&region)?;

    let state = engine.set_state(key);
    let mut set = state.lock().await;

    // Only sources that already hold entries participate, highest
    // priority first.
    let candidates: Vec<SourceId> = engine
        .resolver
        .order(sources)
        .iter()
        .map(|s| s.id())
        .filter(|id| set.entry(id).is_some())
        .collect();

    if candidates.is_empty() {
        return Ok(OperationSummary {
            total_selected: set.total_selected(),
            ..Default::default()
        });
    }

    debug!(
        set = %key,
        sources = candidates.len(),
        top_only = options.top_only,
        mode = ?mode,
        "selection filter starting"
    );
    engine.store.apply(
        key,
        SelectionEvent::Started {
            sources: candidates.clone(),
        },
    );

    let mut consumed = false;
    let mut winner: Option<SourceId> = None;

    for source in &candidates {
        if consumed {
            match mode {
                // dropRest: every later entry is dropped regardless of
                // its own filter result.
                FilterMode::Intersect => {
                    let removed = set.remove_entry(source);
                    engine.limiter.release(key, removed);
                    emit_end(engine, key, source.clone(), None);
                }
                // ignoreRest: later entries are left untouched.
                FilterMode::Subtract => {
                    let entry = set.entry(source).cloned();
                    emit_end(engine, key, source.clone(), entry);
                }
            }
            continue;
        }

        let Some(mut entry) = set.take_entry(source) else {
            continue;
        };

        let total = entry.features.len();
        let kept: Vec<Feature> = entry
            .features
            .drain(..)
            .filter(|f| {
                let matches = engine.comparator.matches(&region, &f.geometry);
                match mode {
                    FilterMode::Intersect => matches,
                    FilterMode::Subtract => !matches,
                }
            })
            .collect();
        let removed = total - kept.len();

        match mode {
            FilterMode::Intersect => {
                if options.top_only && !kept.is_empty() {
                    consumed = true;
                    winner = Some(source.clone());
                }
            }
            FilterMode::Subtract => {
                if options.top_only && removed > 0 {
                    consumed = true;
                    winner = Some(source.clone());
                }
            }
        }

        engine.limiter.release(key, removed);
        if kept.is_empty() {
            emit_end(engine, key, source.clone(), None);
        } else {
            entry.features = kept;
            set.put_entry(entry.clone());
            emit_end(engine, key, source.clone(), Some(entry));
        }
    }

    debug!(
        set = %key,
        total = set.total_selected(),
        winner = winner.as_ref().map(|w| w.as_str()).unwrap_or("-"),
        "selection filter finished"
    );

    Ok(OperationSummary {
        queried: candidates,
        winner,
        total_selected: set.total_selected(),
        truncated: false,
        failed_sources: 0,
    })
}

fn emit_end(
    engine: &SelectionEngine,
    key: &SetKey,
    source: SourceId,
    entry: Option<crate::store::SelectionEntry>,
) {
    engine.store.apply(key, SelectionEvent::Ended { source, entry });
}
