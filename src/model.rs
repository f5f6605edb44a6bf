use serde::{Deserialize, Serialize};

/// One task as supplied by the conversation loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// ISO-8601 timestamp; compared lexically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A tentative parent returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateMatch {
    pub parent_task_id: String,
    pub matched_prefix_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IndexStats {
    /// Distinct registered keys.
    pub total_nodes: usize,
    /// Distinct (key, task id) registrations.
    pub total_instructions: usize,
}

/// An accepted child -> parent edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    pub child: String,
    pub parent: String,
    pub matched_prefix_length: usize,
    /// How many candidates the lookup produced before the tie-break.
    pub candidates: usize,
}
