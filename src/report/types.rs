use serde::Serialize;

/// Resolution state of a discussion as shown in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Unresolved,
    Resolved,
    /// No note in the thread can be resolved
    Comment,
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadState::Unresolved => write!(f, "UNRESOLVED"),
            ThreadState::Resolved => write!(f, "RESOLVED"),
            ThreadState::Comment => write!(f, "COMMENT"),
        }
    }
}

/// One discussion thread, flattened for display.
#[derive(Debug, Clone, Serialize)]
pub struct DiscussionSummary {
    pub id: String,
    /// `path:line` of the anchor, when it has one
    pub location: Option<String>,
    /// Author of the first note
    pub author: String,
    /// First line of the first note's body
    pub excerpt: String,
    pub notes: usize,
    pub state: ThreadState,
    pub resolved_by: Option<String>,
    /// Whether the anchor still points into the current comparison
    pub active: bool,
}

/// Discussions of one noteable against its current comparison.
#[derive(Debug, Serialize)]
pub struct ReviewReport {
    pub noteable: String,
    /// Current comparison, `None` when the noteable has no diff
    pub diff_refs: Option<String>,
    pub discussions: Vec<DiscussionSummary>,
    pub unresolved: usize,
    pub outdated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_state_ordering() {
        assert!(ThreadState::Unresolved < ThreadState::Resolved);
        assert!(ThreadState::Resolved < ThreadState::Comment);
    }

    #[test]
    fn test_thread_state_display() {
        assert_eq!(ThreadState::Unresolved.to_string(), "UNRESOLVED");
        assert_eq!(ThreadState::Resolved.to_string(), "RESOLVED");
        assert_eq!(ThreadState::Comment.to_string(), "COMMENT");
    }

    #[test]
    fn test_summary_serializes_state_in_snake_case() {
        let summary = DiscussionSummary {
            id: "abc".to_string(),
            location: Some("a.rb:3".to_string()),
            author: "alice".to_string(),
            excerpt: "nit".to_string(),
            notes: 1,
            state: ThreadState::Unresolved,
            resolved_by: None,
            active: true,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["state"], "unresolved");
        assert_eq!(json["location"], "a.rb:3");
    }
}
