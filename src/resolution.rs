//! Resolve/unresolve state transitions shared by single notes, discussions
//! and bulk operations.
//!
//! There is exactly one transition function, [`apply`]. Resolving a single
//! note runs it over a one-element collection, so bulk and instance paths
//! cannot drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolution fields carried by every resolvable note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Resolve { by: String, at: DateTime<Utc> },
    Unresolve,
}

impl Transition {
    /// Resolve now, on behalf of `actor`.
    pub fn resolve(actor: &str) -> Self {
        Self::resolve_at(actor, Utc::now())
    }

    pub fn resolve_at(actor: &str, at: DateTime<Utc>) -> Self {
        Transition::Resolve {
            by: actor.to_string(),
            at,
        }
    }
}

pub trait Resolvable {
    /// System notes and notes on immutable commits are never resolvable.
    fn resolvable(&self) -> bool;

    fn resolution(&self) -> &Resolution;

    fn resolution_mut(&mut self) -> &mut Resolution;

    fn is_resolved(&self) -> bool {
        self.resolvable() && self.resolution().is_resolved()
    }

    /// Resolve this note. Returns whether anything changed.
    fn resolve(&mut self, actor: &str) -> bool
    where
        Self: Sized,
    {
        apply(std::iter::once(self), &Transition::resolve(actor)) > 0
    }

    /// Unresolve this note. Returns whether anything changed.
    fn unresolve(&mut self) -> bool
    where
        Self: Sized,
    {
        apply(std::iter::once(self), &Transition::Unresolve) > 0
    }
}

/// Apply `transition` to every note in `notes` and return how many changed.
///
/// Non-resolvable notes are skipped, already-resolved notes keep their
/// original `resolved_at`/`resolved_by`, and unresolving a note that is not
/// resolved is a no-op. The whole collection is updated in one synchronous
/// pass, so no caller can observe part of it transitioned.
pub fn apply<'a, R, I>(notes: I, transition: &Transition) -> usize
where
    R: Resolvable + 'a,
    I: IntoIterator<Item = &'a mut R>,
{
    notes
        .into_iter()
        .filter(|note| note.resolvable())
        .map(|note| step(note.resolution_mut(), transition))
        .filter(|changed| *changed)
        .count()
}

fn step(resolution: &mut Resolution, transition: &Transition) -> bool {
    match transition {
        Transition::Resolve { by, at } => {
            if resolution.is_resolved() {
                return false;
            }
            resolution.resolved_at = Some(*at);
            resolution.resolved_by = Some(by.clone());
            true
        }
        Transition::Unresolve => {
            if !resolution.is_resolved() {
                return false;
            }
            *resolution = Resolution::default();
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Fake {
        resolvable: bool,
        resolution: Resolution,
    }

    impl Resolvable for Fake {
        fn resolvable(&self) -> bool {
            self.resolvable
        }
        fn resolution(&self) -> &Resolution {
            &self.resolution
        }
        fn resolution_mut(&mut self) -> &mut Resolution {
            &mut self.resolution
        }
    }

    fn fake(resolvable: bool) -> Fake {
        Fake {
            resolvable,
            resolution: Resolution::default(),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_resolve_twice_is_idempotent() {
        let mut note = fake(true);
        assert!(note.resolve("alice"));
        let once = note.clone();
        assert!(!note.resolve("bob"));
        assert_eq!(note, once);
        assert_eq!(note.resolution.resolved_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_unresolve_without_resolve_is_noop() {
        let mut note = fake(true);
        assert!(!note.unresolve());
        assert_eq!(note.resolution, Resolution::default());
    }

    #[test]
    fn test_non_resolvable_notes_are_untouched() {
        let mut note = fake(false);
        assert!(!note.resolve("alice"));
        assert!(!note.is_resolved());
        assert_eq!(note.resolution, Resolution::default());
    }

    #[test]
    fn test_bulk_matches_individual() {
        let transition = Transition::resolve_at("alice", noon());
        let mut pre_resolved = fake(true);
        apply(std::iter::once(&mut pre_resolved), &Transition::resolve_at("carol", noon()));
        let start = vec![fake(true), fake(false), pre_resolved, fake(true)];

        let mut bulk = start.clone();
        let changed = apply(bulk.iter_mut(), &transition);

        let mut individual = start.clone();
        for note in individual.iter_mut() {
            apply(std::iter::once(note), &transition);
        }

        assert_eq!(changed, 2);
        assert_eq!(bulk, individual);
        assert_eq!(bulk[2].resolution.resolved_by.as_deref(), Some("carol"));
    }

    #[test]
    fn test_bulk_unresolve() {
        let mut notes = vec![fake(true), fake(true)];
        apply(notes.iter_mut(), &Transition::resolve_at("alice", noon()));
        assert_eq!(apply(notes.iter_mut(), &Transition::Unresolve), 2);
        assert!(notes.iter().all(|n| !n.is_resolved()));
        assert_eq!(apply(notes.iter_mut(), &Transition::Unresolve), 0);
    }
}
