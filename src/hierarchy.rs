//! Turns candidate lists into a parent tree.
//!
//! The index only reports candidates. Picking one parent per child is a
//! policy decision, made here by [`TieBreak`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::{bail, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::matcher::{HierarchyMatcher, MatchConfig};
use crate::model::{CandidateMatch, IndexStats, ParentLink, TaskRecord};

/// How to choose among several candidate parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Link only when a single candidate remains.
    None,
    /// Longest matched prefix wins.
    Longest,
    /// Longest match, then the most recent parent created before the child.
    #[default]
    Newest,
    /// Like `Newest`, but parents in the child's workspace come first.
    Workspace,
}

impl TieBreak {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "longest" => Ok(Self::Longest),
            "newest" => Ok(Self::Newest),
            "workspace" => Ok(Self::Workspace),
            _ => bail!("invalid tie-break '{s}': must be none, longest, newest, or workspace"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Longest => "longest",
            Self::Newest => "newest",
            Self::Workspace => "workspace",
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted child -> parent edges of a pass.
#[derive(Debug, Default, Clone)]
pub struct Lineage {
    parents: HashMap<String, String>,
}

impl Lineage {
    pub fn parent_of(&self, child: &str) -> Option<&str> {
        self.parents.get(child).map(String::as_str)
    }

    /// True if `ancestor` is reached by walking up from `task`.
    pub fn is_descendant(&self, task: &str, ancestor: &str) -> bool {
        let mut current = task;
        // Bounded by the edge count so corrupt input cannot loop forever.
        for _ in 0..=self.parents.len() {
            match self.parent_of(current) {
                Some(p) if p == ancestor => return true,
                Some(p) => current = p,
                None => return false,
            }
        }
        false
    }

    pub fn link(&mut self, child: &str, parent: &str) -> Result<()> {
        if child == parent {
            bail!("task '{child}' cannot be its own parent");
        }
        if let Some(existing) = self.parent_of(child) {
            bail!("task '{child}' already has parent '{existing}'");
        }
        if self.is_descendant(parent, child) {
            bail!("linking '{child}' under '{parent}' would create a cycle");
        }
        self.parents.insert(child.to_string(), parent.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Picked(CandidateMatch),
    /// Candidates the policy could not separate.
    Ambiguous(Vec<CandidateMatch>),
}

/// Apply `policy` to a non-empty candidate list for `child`.
pub fn select_parent(
    child: &TaskRecord,
    candidates: &[CandidateMatch],
    tasks: &HashMap<&str, &TaskRecord>,
    policy: TieBreak,
) -> Selection {
    if candidates.len() == 1 {
        return Selection::Picked(candidates[0].clone());
    }
    if policy == TieBreak::None {
        return Selection::Ambiguous(candidates.to_vec());
    }

    let longest = candidates
        .iter()
        .map(|c| c.matched_prefix_length)
        .max()
        .unwrap_or(0);
    let mut pool: Vec<&CandidateMatch> = candidates
        .iter()
        .filter(|c| c.matched_prefix_length == longest)
        .collect();

    if policy == TieBreak::Workspace && child.workspace.is_some() {
        let same: Vec<&CandidateMatch> = pool
            .iter()
            .copied()
            .filter(|c| workspace_of(tasks, &c.parent_task_id) == child.workspace.as_deref())
            .collect();
        if !same.is_empty() {
            pool = same;
        }
    }

    if matches!(policy, TieBreak::Newest | TieBreak::Workspace) && pool.len() > 1 {
        pool = newest_before(child, pool, tasks);
    }

    if pool.len() == 1 {
        Selection::Picked(pool[0].clone())
    } else {
        Selection::Ambiguous(pool.into_iter().cloned().collect())
    }
}

fn workspace_of<'a>(tasks: &HashMap<&str, &'a TaskRecord>, id: &str) -> Option<&'a str> {
    tasks.get(id).and_then(|t| t.workspace.as_deref())
}

fn created_at_of<'a>(tasks: &HashMap<&str, &'a TaskRecord>, id: &str) -> Option<&'a str> {
    tasks.get(id).and_then(|t| t.created_at.as_deref())
}

/// Parents created no later than the child, narrowed to the latest timestamp.
fn newest_before<'c>(
    child: &TaskRecord,
    pool: Vec<&'c CandidateMatch>,
    tasks: &HashMap<&str, &TaskRecord>,
) -> Vec<&'c CandidateMatch> {
    let eligible: Vec<&CandidateMatch> = match child.created_at.as_deref() {
        Some(child_at) => {
            let earlier: Vec<&CandidateMatch> = pool
                .iter()
                .copied()
                .filter(|c| created_at_of(tasks, &c.parent_task_id).is_some_and(|at| at <= child_at))
                .collect();
            if earlier.is_empty() {
                pool
            } else {
                earlier
            }
        }
        None => pool,
    };

    let Some(latest) = eligible
        .iter()
        .filter_map(|c| created_at_of(tasks, &c.parent_task_id))
        .max()
    else {
        return eligible;
    };
    eligible
        .into_iter()
        .filter(|c| created_at_of(tasks, &c.parent_task_id) == Some(latest))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousChild {
    pub child: String,
    pub candidates: Vec<CandidateMatch>,
}

/// Outcome of one reconstruction pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconstruction {
    pub tasks: usize,
    pub sub_instructions: usize,
    pub links: Vec<ParentLink>,
    pub ambiguous: Vec<AmbiguousChild>,
    pub stats: IndexStats,
}

/// One batch pass over a corpus: register every task as a potential parent,
/// then resolve children oldest first.
pub fn reconstruct(tasks: &[TaskRecord], config: &MatchConfig, policy: TieBreak) -> Reconstruction {
    let mut matcher = HierarchyMatcher::new(config.clone());
    let mut sub_instructions = 0;
    for task in tasks {
        let n = matcher.add_parent_task_with_sub_instructions(&task.id, &task.instruction);
        if n > 0 {
            debug!("{}: registered {n} sub-instruction(s)", task.id);
        }
        sub_instructions += n;
    }

    let by_id: HashMap<&str, &TaskRecord> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut order: Vec<&TaskRecord> = tasks.iter().collect();
    order.sort_by(|a, b| {
        (a.created_at.is_none(), &a.created_at, &a.id).cmp(&(b.created_at.is_none(), &b.created_at, &b.id))
    });

    let mut lineage = Lineage::default();
    let mut links = Vec::new();
    let mut ambiguous = Vec::new();
    let mut seen = HashSet::new();

    for child in order {
        if !seen.insert(child.id.as_str()) {
            warn!("duplicate task id '{}' skipped", child.id);
            continue;
        }
        let candidates = matcher.resolve_parent(&child.id, &child.instruction, &lineage);
        if candidates.is_empty() {
            continue;
        }
        match select_parent(child, &candidates, &by_id, policy) {
            Selection::Picked(m) => match lineage.link(&child.id, &m.parent_task_id) {
                Ok(()) => links.push(ParentLink {
                    child: child.id.clone(),
                    parent: m.parent_task_id,
                    matched_prefix_length: m.matched_prefix_length,
                    candidates: candidates.len(),
                }),
                Err(e) => warn!("{e:#}"),
            },
            Selection::Ambiguous(pool) => {
                debug!("{}: {} candidates left after tie-break", child.id, pool.len());
                ambiguous.push(AmbiguousChild {
                    child: child.id.clone(),
                    candidates: pool,
                });
            }
        }
    }

    info!(
        "reconstructed {} link(s) over {} task(s), {} ambiguous",
        links.len(),
        tasks.len(),
        ambiguous.len()
    );

    Reconstruction {
        tasks: tasks.len(),
        sub_instructions,
        links,
        ambiguous,
        stats: matcher.stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, instruction: &str, workspace: Option<&str>, created_at: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            instruction: instruction.to_string(),
            workspace: workspace.map(|s| s.to_string()),
            created_at: Some(created_at.to_string()),
        }
    }

    fn candidate(id: &str, len: usize) -> CandidateMatch {
        CandidateMatch {
            parent_task_id: id.to_string(),
            matched_prefix_length: len,
        }
    }

    fn picked_id(selection: &Selection) -> Option<&str> {
        match selection {
            Selection::Picked(m) => Some(m.parent_task_id.as_str()),
            Selection::Ambiguous(_) => None,
        }
    }

    #[test]
    fn tie_break_parse_roundtrip() {
        for p in [TieBreak::None, TieBreak::Longest, TieBreak::Newest, TieBreak::Workspace] {
            assert_eq!(TieBreak::parse(p.as_str()).unwrap(), p);
        }
        assert!(TieBreak::parse("oldest").is_err());
    }

    #[test]
    fn link_rejects_cycles() {
        let mut lineage = Lineage::default();
        lineage.link("b", "a").unwrap();
        lineage.link("c", "b").unwrap();
        assert!(lineage.is_descendant("c", "a"));
        assert!(!lineage.is_descendant("a", "c"));
        assert!(lineage.link("a", "c").is_err());
        assert!(lineage.link("a", "a").is_err());
        assert!(lineage.link("c", "a").is_err(), "already has a parent");
        assert_eq!(lineage.len(), 2);
    }

    #[test]
    fn single_candidate_is_picked_under_any_policy() {
        let child = task("c", "x", None, "2025-01-02T00:00:00Z");
        let tasks = HashMap::new();
        let sel = select_parent(&child, &[candidate("p", 10)], &tasks, TieBreak::None);
        assert_eq!(picked_id(&sel), Some("p"));
    }

    #[test]
    fn none_policy_keeps_ties_ambiguous() {
        let child = task("c", "x", None, "2025-01-02T00:00:00Z");
        let tasks = HashMap::new();
        let sel = select_parent(&child, &[candidate("p1", 40), candidate("p2", 10)], &tasks, TieBreak::None);
        assert!(matches!(sel, Selection::Ambiguous(ref c) if c.len() == 2));
    }

    #[test]
    fn longest_policy_prefers_longer_match() {
        let child = task("c", "x", None, "2025-01-02T00:00:00Z");
        let tasks = HashMap::new();
        let sel = select_parent(&child, &[candidate("p1", 40), candidate("p2", 10)], &tasks, TieBreak::Longest);
        assert_eq!(picked_id(&sel), Some("p1"));
        let sel = select_parent(&child, &[candidate("p1", 40), candidate("p2", 40)], &tasks, TieBreak::Longest);
        assert!(matches!(sel, Selection::Ambiguous(_)));
    }

    #[test]
    fn newest_policy_prefers_latest_parent_before_child() {
        let p1 = task("p1", "", None, "2025-01-01T00:00:00Z");
        let p2 = task("p2", "", None, "2025-01-02T00:00:00Z");
        let p3 = task("p3", "", None, "2025-01-09T00:00:00Z");
        let child = task("c", "", None, "2025-01-03T00:00:00Z");
        let tasks: HashMap<&str, &TaskRecord> = [("p1", &p1), ("p2", &p2), ("p3", &p3)].into_iter().collect();
        let sel = select_parent(
            &child,
            &[candidate("p1", 20), candidate("p2", 20), candidate("p3", 20)],
            &tasks,
            TieBreak::Newest,
        );
        assert_eq!(picked_id(&sel), Some("p2"));
    }

    #[test]
    fn workspace_policy_prefers_same_workspace() {
        let p1 = task("p1", "", Some("/repo/a"), "2025-01-01T00:00:00Z");
        let p2 = task("p2", "", Some("/repo/b"), "2025-01-02T00:00:00Z");
        let child = task("c", "", Some("/repo/a"), "2025-01-03T00:00:00Z");
        let tasks: HashMap<&str, &TaskRecord> = [("p1", &p1), ("p2", &p2)].into_iter().collect();
        let cands = [candidate("p1", 20), candidate("p2", 20)];
        assert_eq!(picked_id(&select_parent(&child, &cands, &tasks, TieBreak::Workspace)), Some("p1"));
        assert_eq!(picked_id(&select_parent(&child, &cands, &tasks, TieBreak::Newest)), Some("p2"));
    }

    #[test]
    fn reconstruct_links_children_to_quoting_parent() {
        let tasks = vec![
            task(
                "P",
                "1. Spawn with message: \"A1: do X\"\n2. Spawn with message: \"A2: do Y\"",
                None,
                "2025-01-01T00:00:00Z",
            ),
            task("C1", "A1: do X", None, "2025-01-01T00:01:00Z"),
            task("C2", "A2: do Y", None, "2025-01-01T00:02:00Z"),
            task("C3", "B1: do Z", None, "2025-01-01T00:03:00Z"),
        ];
        let result = reconstruct(&tasks, &MatchConfig::default(), TieBreak::Newest);
        assert_eq!(result.tasks, 4);
        assert_eq!(result.sub_instructions, 2);
        let pairs: Vec<(&str, &str)> = result
            .links
            .iter()
            .map(|l| (l.child.as_str(), l.parent.as_str()))
            .collect();
        assert_eq!(pairs, vec![("C1", "P"), ("C2", "P")]);
        assert!(result.ambiguous.is_empty());
    }

    #[test]
    fn reconstruct_reports_ambiguous_children() {
        let template = "1. Message: \"Run the shared template step\"";
        let tasks = vec![
            task("P1", template, None, "2025-01-01T00:00:00Z"),
            task("P2", template, None, "2025-01-01T00:00:00Z"),
            task("C", "Run the shared template step", None, "2025-01-02T00:00:00Z"),
        ];
        let result = reconstruct(&tasks, &MatchConfig::default(), TieBreak::Newest);
        assert!(result.links.is_empty());
        assert_eq!(result.ambiguous.len(), 1);
        assert_eq!(result.ambiguous[0].candidates.len(), 2);
    }
}
