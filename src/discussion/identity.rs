//! Deterministic discussion identities.
//!
//! A discussion id is the SHA-1 of `discussion-<noteable_type>-<noteable_id>`
//! followed by the anchor's key segments, all joined by `-`. The anchor never
//! includes revision pointers, so the id survives pushes that leave the
//! anchored path and lines alone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::sha1_str;
use crate::position::PositionKey;

const SEPARATOR: &str = "-";

/// 40-character lowercase hex identity of a discussion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscussionId(String);

impl DiscussionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiscussionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute a discussion id from the noteable and an optional anchor.
///
/// An empty `anchor` yields the id used for plain, unanchored notes.
pub fn compute_id(noteable_type: &str, noteable_id: &str, anchor: &[String]) -> DiscussionId {
    let mut parts: Vec<&str> = vec!["discussion", noteable_type, noteable_id];
    parts.extend(anchor.iter().map(String::as_str));
    DiscussionId(sha1_str(&parts.join(SEPARATOR)))
}

/// Discussion id of a note anchored at `key`.
pub fn compute_position_id(
    noteable_type: &str,
    noteable_id: &str,
    key: &PositionKey,
) -> DiscussionId {
    compute_id(noteable_type, noteable_id, &key.segments())
}

/// Id of the discussion as first created. Same function, evaluated once
/// against the position as first stored; callers must never re-run it after
/// the position has been migrated.
pub fn compute_original_id(
    noteable_type: &str,
    noteable_id: &str,
    original: &PositionKey,
) -> DiscussionId {
    compute_position_id(noteable_type, noteable_id, original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{DiffPosition, DiffRefs, ImageCoords};

    #[test]
    fn test_plain_id_matches_joined_digest() {
        let id = compute_id("merge_request", "5", &[]);
        assert_eq!(id.as_str(), sha1_str("discussion-merge_request-5"));
        assert_eq!(id.as_str().len(), 40);
    }

    #[test]
    fn test_same_key_different_shas_same_id() {
        let a = DiffPosition::added("a.rb", 10, &DiffRefs::new("b1", "s1", "h1"));
        let b = DiffPosition::added("a.rb", 10, &DiffRefs::new("b2", "s2", "h2"));
        assert_eq!(
            compute_position_id("merge_request", "MR#5", &a.key()),
            compute_position_id("merge_request", "MR#5", &b.key())
        );
    }

    #[test]
    fn test_noteable_and_key_both_matter() {
        let refs = DiffRefs::new("b1", "s1", "h1");
        let line_10 = DiffPosition::added("a.rb", 10, &refs).key();
        let line_11 = DiffPosition::added("a.rb", 11, &refs).key();
        let base = compute_position_id("merge_request", "5", &line_10);
        assert_ne!(base, compute_position_id("merge_request", "6", &line_10));
        assert_ne!(base, compute_position_id("commit", "5", &line_10));
        assert_ne!(base, compute_position_id("merge_request", "5", &line_11));
        assert_ne!(base, compute_id("merge_request", "5", &[]));
    }

    #[test]
    fn test_image_and_text_never_collide() {
        let refs = DiffRefs::new("b1", "s1", "h1");
        let text = DiffPosition::added("a.png", 10, &refs).key();
        let coords = ImageCoords { x: 10, y: 0, width: 0, height: 0 };
        let image = DiffPosition::image("a.png", coords, &refs).key();
        assert_ne!(
            compute_position_id("merge_request", "5", &text),
            compute_position_id("merge_request", "5", &image)
        );
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = compute_id("commit", "abc", &[]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: DiscussionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
