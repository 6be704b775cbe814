//! Top-only race bookkeeping.
//!
//! In top-only mode many sources settle concurrently but only the
//! highest-priority one with a qualifying result may keep its entry.
//! [`RaceState`] is owned by the operation's coordinator loop, giving
//! the "current best" pointer a single writer; per-source tasks never
//! touch it directly.

use crate::feature::Feature;
use crate::ordering::OrderingResolver;
use crate::source::SourceId;
use std::collections::HashSet;

/// A source holding a qualifying result, competing to be the winner.
#[derive(Debug)]
pub(crate) struct Contender {
    pub source: SourceId,
    /// New features this source would contribute if it wins. May be
    /// empty when the source qualifies through already-selected
    /// features (the Add re-selection case).
    pub features: Vec<Feature>,
}

/// Outcome of presenting a contender to the race.
pub(crate) enum Challenge {
    /// The contender is the new provisional best; `retired` is the
    /// previous best it displaced, which must now receive its terminal
    /// event.
    Adopted { retired: Option<Contender> },
    /// The contender lost to the current best and is returned so the
    /// caller can emit its terminal event.
    Rejected(Contender),
}

/// Single-writer state of one top-only race.
pub(crate) struct RaceState {
    best: Option<Contender>,
    unfinished: HashSet<SourceId>,
}

impl RaceState {
    /// Starts a race over the given queried sources.
    pub(crate) fn new(sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            best: None,
            unfinished: sources.into_iter().collect(),
        }
    }

    /// Marks a source as settled (result, failure, or cancellation).
    ///
    /// Must be called before dominance checks so a source never blocks
    /// its own victory.
    pub(crate) fn mark_finished(&mut self, source: &SourceId) {
        self.unfinished.remove(source);
    }

    /// Presents a contender; adopts it if it strictly outranks the
    /// current best.
    ///
    /// Equal or lower priority loses. Structure order is total, so equal
    /// only arises for a source missing from the structure.
    pub(crate) fn challenge(
        &mut self,
        resolver: &OrderingResolver,
        contender: Contender,
    ) -> Challenge {
        match &self.best {
            Some(best) if !resolver.is_higher(&contender.source, &best.source) => {
                Challenge::Rejected(contender)
            }
            _ => Challenge::Adopted {
                retired: self.best.replace(contender),
            },
        }
    }

    /// Returns true if the current best outranks every unfinished
    /// source, proving no later settlement can displace it.
    pub(crate) fn best_is_dominant(&self, resolver: &OrderingResolver) -> bool {
        match &self.best {
            Some(best) => resolver.is_top_among(&best.source, self.unfinished.iter()),
            None => false,
        }
    }

    /// Consumes the race, yielding the winner if any source qualified.
    pub(crate) fn into_best(self) -> Option<Contender> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::StaticStructure;
    use std::sync::Arc;

    fn resolver(top_down: &[&str]) -> OrderingResolver {
        OrderingResolver::new(Arc::new(StaticStructure::new(
            top_down.iter().map(|n| SourceId::new(*n)).collect(),
        )))
    }

    fn contender(name: &str) -> Contender {
        Contender {
            source: SourceId::new(name),
            features: vec![Feature::point(1, 0.0, 0.0)],
        }
    }

    fn ids(names: &[&str]) -> Vec<SourceId> {
        names.iter().map(|n| SourceId::new(*n)).collect()
    }

    #[test]
    fn test_first_contender_is_adopted() {
        let r = resolver(&["a", "b"]);
        let mut race = RaceState::new(ids(&["a", "b"]));

        match race.challenge(&r, contender("b")) {
            Challenge::Adopted { retired } => assert!(retired.is_none()),
            Challenge::Rejected(_) => panic!("first contender must be adopted"),
        }
    }

    #[test]
    fn test_higher_priority_retires_leader() {
        let r = resolver(&["a", "b"]);
        let mut race = RaceState::new(ids(&["a", "b"]));

        race.challenge(&r, contender("b"));
        match race.challenge(&r, contender("a")) {
            Challenge::Adopted { retired } => {
                assert_eq!(retired.unwrap().source, SourceId::new("b"));
            }
            Challenge::Rejected(_) => panic!("higher priority must win"),
        }
    }

    #[test]
    fn test_lower_priority_is_rejected() {
        let r = resolver(&["a", "b"]);
        let mut race = RaceState::new(ids(&["a", "b"]));

        race.challenge(&r, contender("a"));
        match race.challenge(&r, contender("b")) {
            Challenge::Rejected(loser) => assert_eq!(loser.source, SourceId::new("b")),
            Challenge::Adopted { .. } => panic!("lower priority must lose"),
        }
    }

    #[test]
    fn test_dominance_requires_outranking_all_unfinished() {
        let r = resolver(&["a", "b", "c"]);
        let mut race = RaceState::new(ids(&["a", "b", "c"]));

        race.mark_finished(&SourceId::new("b"));
        race.challenge(&r, contender("b"));
        // "a" is still unfinished and outranks "b"
        assert!(!race.best_is_dominant(&r));

        race.mark_finished(&SourceId::new("a"));
        // Only "c" remains, and "b" outranks it
        assert!(race.best_is_dominant(&r));
    }

    #[test]
    fn test_no_best_is_never_dominant() {
        let r = resolver(&["a"]);
        let mut race = RaceState::new(ids(&["a"]));
        assert!(!race.best_is_dominant(&r));

        race.mark_finished(&SourceId::new("a"));
        assert!(!race.best_is_dominant(&r));
    }

    #[test]
    fn test_into_best_yields_winner() {
        let r = resolver(&["a", "b"]);
        let mut race = RaceState::new(ids(&["a", "b"]));

        race.challenge(&r, contender("b"));
        race.challenge(&r, contender("a"));

        let best = race.into_best().unwrap();
        assert_eq!(best.source, SourceId::new("a"));
    }
}
