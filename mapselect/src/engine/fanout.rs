//! New/Add fan-out and settlement coordination.
//!
//! One cancellable query task per queried source, all sharing a single
//! operation token. Settlements flow through an mpsc channel into the
//! coordinator loop below, which owns the race state and the capacity
//! scope; per-source tasks never touch shared mutable state. The loop
//! ends when every task has settled or been cancelled, and every queried
//! source receives exactly one terminal event.

use super::race::{Challenge, Contender, RaceState};
use super::{OperationOptions, OperationSummary, SelectionError, SelectionEngine};
use crate::capacity::CapacityScope;
use crate::feature::{Feature, ObjectId};
use crate::geometry::{Envelope, GeometryKind, QueryRegion};
use crate::set::SelectionSet;
use crate::source::{FeatureSource, QueryError, QuerySpec, SourceId};
use crate::store::{SelectionEntry, SelectionEvent, SetKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How query results combine with existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Prior entries for the queried sources are dropped first (New).
    Replace,
    /// Results merge into existing entries, excluding already-selected
    /// object ids (Add).
    Merge,
}

enum SettleOutcome {
    Results(Vec<Feature>),
    Failed(QueryError),
    Cancelled,
}

struct Settlement {
    source: SourceId,
    outcome: SettleOutcome,
}

pub(super) async fn run(
    engine: &SelectionEngine,
    key: &SetKey,
    region: QueryRegion,
    sources: Vec<Arc<dyn FeatureSource>>,
    options: OperationOptions,
    mode: QueryMode,
) -> Result<OperationSummary, SelectionError> {
    engine.validate_region(&region)?;

    let state = engine.set_state(key);
    let mut set = state.lock().await;

    let eligible: Vec<Arc<dyn FeatureSource>> = sources
        .into_iter()
        .filter(|s| !options.visible_only || s.is_visible())
        .filter(|s| !options.selectable_only || s.is_selectable())
        .collect();
    let resolved = engine.resolver.order(eligible);

    if resolved.is_empty() {
        return Ok(OperationSummary {
            total_selected: set.total_selected(),
            ..Default::default()
        });
    }

    let ids: Vec<SourceId> = resolved.iter().map(|s| s.id()).collect();

    if mode == QueryMode::Replace {
        for id in &ids {
            let removed = set.remove_entry(id);
            engine.limiter.release(key, removed);
        }
    }

    debug!(
        set = %key,
        sources = ids.len(),
        top_only = options.top_only,
        mode = ?mode,
        "selection fan-out starting"
    );
    engine.store.apply(
        key,
        SelectionEvent::Started {
            sources: ids.clone(),
        },
    );

    let scope = Arc::clone(&engine.limiter).begin(
        key.clone(),
        set.max_record_count(),
        Arc::clone(&engine.notifier),
    );
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Settlement>();

    for source in &resolved {
        let spec = build_spec(engine, &set, source.as_ref(), &region, mode);
        spawn_source_query(
            Arc::clone(source),
            spec,
            token.clone(),
            tx.clone(),
            engine.config.query_timeout,
        );
    }
    drop(tx);

    let mut race = options.top_only.then(|| RaceState::new(ids.iter().cloned()));
    let mut pending_terminal: HashSet<SourceId> = ids.iter().cloned().collect();
    let mut failures = 0usize;

    // Coordinator loop: single writer for race state and capacity. Ends
    // when every query task has settled (the last sender drops).
    while let Some(Settlement { source, outcome }) = rx.recv().await {
        if let Some(race) = race.as_mut() {
            race.mark_finished(&source);
        }

        match outcome {
            SettleOutcome::Failed(error) => {
                warn!(set = %key, source = %source, error = %error, "source query failed");
                failures += 1;
                emit_fail(engine, key, &mut pending_terminal, source, error);
            }
            SettleOutcome::Cancelled => {
                debug!(set = %key, source = %source, "source query cancelled");
                emit_end_current(engine, key, &set, &mut pending_terminal, &source);
            }
            SettleOutcome::Results(found) => {
                let fresh = dedup_against_existing(&set, &source, found, mode);
                match race.as_mut() {
                    None => settle_immediate(
                        engine,
                        key,
                        &mut set,
                        &scope,
                        &token,
                        &mut pending_terminal,
                        source,
                        fresh,
                        mode,
                    ),
                    Some(race_state) => settle_contender(
                        engine,
                        key,
                        &set,
                        race_state,
                        &mut pending_terminal,
                        source,
                        fresh,
                        &region,
                        mode,
                    ),
                }
            }
        }

        if let Some(race) = race.as_ref() {
            if !token.is_cancelled() && race.best_is_dominant(&engine.resolver) {
                debug!(set = %key, "race winner proven, cancelling remaining queries");
                token.cancel();
            }
        }
    }

    // Finalize the provisional race winner. Capacity is reserved only
    // here; a displaced leader never counts against the cap.
    let mut winner: Option<SourceId> = None;
    if let Some(race_state) = race {
        if let Some(best) = race_state.into_best() {
            let source = best.source;
            let mut fresh = best.features;
            if !fresh.is_empty() {
                let reservation = scope.reserve(fresh.len());
                fresh.truncate(reservation.allowed);
            }
            let entry = if fresh.is_empty() {
                // Re-selection case, or the cap left no room: the
                // existing entry (if any) stands as the winning result.
                set.entry(&source).cloned()
            } else {
                let entry = match mode {
                    QueryMode::Replace => SelectionEntry::new(source.clone(), fresh),
                    QueryMode::Merge => match set.take_entry(&source) {
                        Some(mut existing) => {
                            existing.features.extend(fresh);
                            existing
                        }
                        None => SelectionEntry::new(source.clone(), fresh),
                    },
                };
                set.put_entry(entry.clone());
                Some(entry)
            };
            info!(
                set = %key,
                winner = %source,
                features = entry.as_ref().map(|e| e.len()).unwrap_or(0),
                "top-only selection finalized"
            );
            emit_end(engine, key, &mut pending_terminal, source.clone(), entry);
            winner = Some(source);
        }
    }

    // A query task that aborted without settling still owes its source a
    // terminal event.
    let unsettled: Vec<SourceId> = pending_terminal.iter().cloned().collect();
    for source in unsettled {
        warn!(set = %key, source = %source, "source query task aborted without settling");
        failures += 1;
        emit_fail(
            engine,
            key,
            &mut pending_terminal,
            source,
            QueryError::permanent("query task aborted"),
        );
    }

    surface_results(engine, key, &set, &ids, &winner, options);

    Ok(OperationSummary {
        queried: ids,
        winner,
        total_selected: set.total_selected(),
        truncated: scope.notified(),
        failed_sources: failures,
    })
}

/// Resolves the per-source query parameters: point-region buffer by the
/// source's geometry kind, and exclusion of already-selected ids in
/// Merge mode.
fn build_spec(
    engine: &SelectionEngine,
    set: &SelectionSet,
    source: &dyn FeatureSource,
    region: &QueryRegion,
    mode: QueryMode,
) -> QuerySpec {
    let mut region = region.clone();
    if region.buffer.is_none() && region.geometry.kind() == GeometryKind::Point {
        region.buffer = engine.config.point_buffer_for(source.geometry_kind());
    }
    let exclude = match mode {
        QueryMode::Merge => set.object_ids(&source.id()),
        QueryMode::Replace => Vec::new(),
    };
    QuerySpec {
        region,
        exclude,
        limit: Some(set.max_record_count()),
    }
}

fn spawn_source_query(
    source: Arc<dyn FeatureSource>,
    spec: QuerySpec,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<Settlement>,
    timeout: Option<Duration>,
) {
    tokio::spawn(async move {
        let id = source.id();
        let query = query_with_timeout(source.as_ref(), spec, token.child_token(), timeout);
        let outcome = tokio::select! {
            _ = token.cancelled() => SettleOutcome::Cancelled,
            result = query => match result {
                Ok(features) => SettleOutcome::Results(features),
                Err(error) => SettleOutcome::Failed(error),
            },
        };
        // A failed send means the operation is already gone; nothing is
        // waiting for this settlement.
        let _ = tx.send(Settlement {
            source: id,
            outcome,
        });
    });
}

async fn query_with_timeout(
    source: &dyn FeatureSource,
    spec: QuerySpec,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Result<Vec<Feature>, QueryError> {
    match timeout {
        None => source.query(spec, cancel).await,
        Some(after) => match tokio::time::timeout(after, source.query(spec, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::timed_out(after)),
        },
    }
}

/// Drops features whose object id is already selected for the source.
/// Merge queries exclude those ids, but a source is not trusted to honor
/// the exclusion.
fn dedup_against_existing(
    set: &SelectionSet,
    source: &SourceId,
    found: Vec<Feature>,
    mode: QueryMode,
) -> Vec<Feature> {
    match mode {
        QueryMode::Replace => found,
        QueryMode::Merge => {
            let existing: HashSet<ObjectId> = set.object_ids(source).into_iter().collect();
            if existing.is_empty() {
                found
            } else {
                found
                    .into_iter()
                    .filter(|f| !existing.contains(&f.id))
                    .collect()
            }
        }
    }
}

/// Non-top-only settlement: store the contribution immediately, enforce
/// the record cap, and cancel the remaining queries once the cap is hit.
#[allow(clippy::too_many_arguments)]
fn settle_immediate(
    engine: &SelectionEngine,
    key: &SetKey,
    set: &mut SelectionSet,
    scope: &CapacityScope,
    token: &CancellationToken,
    pending: &mut HashSet<SourceId>,
    source: SourceId,
    mut fresh: Vec<Feature>,
    mode: QueryMode,
) {
    if fresh.is_empty() {
        emit_end_current(engine, key, set, pending, &source);
        return;
    }

    let reservation = scope.reserve(fresh.len());
    if reservation.exceeded && !token.is_cancelled() {
        info!(set = %key, source = %source, "record cap reached, cancelling remaining queries");
        token.cancel();
    }
    fresh.truncate(reservation.allowed);
    if fresh.is_empty() {
        emit_end_current(engine, key, set, pending, &source);
        return;
    }

    let entry = match mode {
        QueryMode::Replace => SelectionEntry::new(source.clone(), fresh),
        QueryMode::Merge => match set.take_entry(&source) {
            Some(mut existing) => {
                existing.features.extend(fresh);
                existing
            }
            None => SelectionEntry::new(source.clone(), fresh),
        },
    };
    set.put_entry(entry.clone());
    emit_end(engine, key, pending, source, Some(entry));
}

/// Top-only settlement: qualifying sources enter the race; only losers
/// and non-contenders get their terminal event here. The provisional
/// leader's event waits for finalization.
#[allow(clippy::too_many_arguments)]
fn settle_contender(
    engine: &SelectionEngine,
    key: &SetKey,
    set: &SelectionSet,
    race: &mut RaceState,
    pending: &mut HashSet<SourceId>,
    source: SourceId,
    fresh: Vec<Feature>,
    region: &QueryRegion,
    mode: QueryMode,
) {
    // An exclusion-filtered empty result can still qualify: if the
    // source's already-selected features match the region, re-selecting
    // them must keep the source in the race.
    let qualifies = !fresh.is_empty()
        || (mode == QueryMode::Merge && existing_still_matches(engine, set, &source, region));

    if !qualifies {
        emit_end_current(engine, key, set, pending, &source);
        return;
    }

    let contender = Contender {
        source: source.clone(),
        features: fresh,
    };
    match race.challenge(&engine.resolver, contender) {
        Challenge::Adopted { retired } => {
            debug!(set = %key, source = %source, "race leader adopted");
            if let Some(previous) = retired {
                emit_end_current(engine, key, set, pending, &previous.source);
            }
        }
        Challenge::Rejected(loser) => {
            debug!(set = %key, source = %loser.source, "race contender outranked");
            emit_end_current(engine, key, set, pending, &loser.source);
        }
    }
}

fn existing_still_matches(
    engine: &SelectionEngine,
    set: &SelectionSet,
    source: &SourceId,
    region: &QueryRegion,
) -> bool {
    set.entry(source)
        .map(|entry| {
            entry
                .features
                .iter()
                .any(|f| engine.comparator.matches(region, &f.geometry))
        })
        .unwrap_or(false)
}

/// Advisory popup/auto-zoom over the operation's final features (winner
/// only in top-only mode).
fn surface_results(
    engine: &SelectionEngine,
    key: &SetKey,
    set: &SelectionSet,
    queried: &[SourceId],
    winner: &Option<SourceId>,
    options: OperationOptions,
) {
    if !options.show_popup && !engine.config.auto_zoom {
        return;
    }

    let final_sources: Vec<&SourceId> = match winner {
        Some(w) => vec![w],
        None if options.top_only => Vec::new(),
        None => queried.iter().collect(),
    };
    let final_features: Vec<Feature> = final_sources
        .iter()
        .filter_map(|s| set.entry(s))
        .flat_map(|e| e.features.iter().cloned())
        .collect();
    if final_features.is_empty() {
        return;
    }

    if options.show_popup {
        let anchor = combined_center(&final_features);
        engine.surfacer.show_popup(key, &final_features, anchor);
    }
    if engine.config.auto_zoom {
        engine.surfacer.fit_viewport(key, &final_features);
    }
}

fn combined_center(features: &[Feature]) -> Option<(f64, f64)> {
    let mut combined: Option<Envelope> = None;
    for feature in features {
        if let Some(env) = feature.geometry.envelope() {
            combined = Some(match combined {
                Some(current) => current.union(&env),
                None => env,
            });
        }
    }
    combined.map(|env| env.center())
}

fn emit_end_current(
    engine: &SelectionEngine,
    key: &SetKey,
    set: &SelectionSet,
    pending: &mut HashSet<SourceId>,
    source: &SourceId,
) {
    let entry = set.entry(source).cloned();
    emit_end(engine, key, pending, source.clone(), entry);
}

fn emit_end(
    engine: &SelectionEngine,
    key: &SetKey,
    pending: &mut HashSet<SourceId>,
    source: SourceId,
    entry: Option<SelectionEntry>,
) {
    pending.remove(&source);
    engine.store.apply(key, SelectionEvent::Ended { source, entry });
}

fn emit_fail(
    engine: &SelectionEngine,
    key: &SetKey,
    pending: &mut HashSet<SourceId>,
    source: SourceId,
    error: QueryError,
) {
    pending.remove(&source);
    engine.store.apply(key, SelectionEvent::Failed { source, error });
}
