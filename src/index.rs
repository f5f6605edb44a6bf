//! Prefix index from canonical keys to the tasks that registered them.
//!
//! The index is a character trie kept in an arena: nodes live in a `Vec` and
//! refer to their children by position. Task ids are stored only on the node
//! where a registered key ends, so a lookup can tell "some key passes through
//! here" apart from "a key stops here".

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::canonical::{compute_canonical_key, normalize_line_breaks, truncation_stem, CanonicalKey};
use crate::model::{CandidateMatch, IndexStats};

/// Shortest shared prefix, in characters, that counts as a match when the two
/// keys are not identical. Zero accepts every prefix relationship.
pub const DEFAULT_MIN_PREFIX_LENGTH: usize = 0;

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<char, NodeId>,
    task_ids: BTreeSet<String>,
    source_text: Option<String>,
}

impl Node {
    fn is_terminal(&self) -> bool {
        !self.task_ids.is_empty()
    }
}

/// Read-only view of one registered key.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry<'a> {
    pub parent_task_ids: &'a BTreeSet<String>,
    /// First text registered under this key, line breaks normalized and cut to
    /// the key's length.
    pub source_text: Option<&'a str>,
}

#[derive(Debug)]
pub struct PrefixIndex {
    nodes: Vec<Node>,
    min_prefix_length: usize,
    total_keys: usize,
    total_instructions: usize,
}

impl Default for PrefixIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PREFIX_LENGTH)
    }
}

impl PrefixIndex {
    pub fn new(min_prefix_length: usize) -> Self {
        Self {
            nodes: vec![Node::default()],
            min_prefix_length,
            total_keys: 0,
            total_instructions: 0,
        }
    }

    /// Register `task_id` under `key`. Returns false if the pair was already
    /// present or the key is empty.
    pub fn add_instruction(
        &mut self,
        task_id: &str,
        key: &CanonicalKey,
        original_text: Option<&str>,
    ) -> bool {
        if key.is_empty() {
            return false;
        }
        let mut node = ROOT;
        for c in key.as_str().chars() {
            node = match self.nodes[node].children.get(&c) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(c, next);
                    next
                }
            };
        }

        let key_len = key.len();
        let entry = &mut self.nodes[node];
        if !entry.is_terminal() {
            self.total_keys += 1;
        }
        if entry.source_text.is_none() {
            entry.source_text =
                original_text.map(|t| normalize_line_breaks(t).chars().take(key_len).collect());
        }
        let added = entry.task_ids.insert(task_id.to_string());
        if added {
            self.total_instructions += 1;
        }
        added
    }

    pub fn entry(&self, key: &CanonicalKey) -> Option<IndexEntry<'_>> {
        if key.is_empty() {
            return None;
        }
        let node = &self.nodes[self.walk(key.as_str())?];
        node.is_terminal().then(|| IndexEntry {
            parent_task_ids: &node.task_ids,
            source_text: node.source_text.as_deref(),
        })
    }

    /// Canonicalize `candidate_text` and return every registered key in a
    /// prefix relationship with it, one match per task.
    pub fn search_exact_prefix(&self, candidate_text: &str, max_length: usize) -> Vec<CandidateMatch> {
        self.search_key(&compute_canonical_key(candidate_text, max_length))
    }

    pub fn search_key(&self, key: &CanonicalKey) -> Vec<CandidateMatch> {
        if key.is_empty() {
            return Vec::new();
        }
        let mut best: HashMap<&str, usize> = HashMap::new();
        let key_len = key.len();

        // Registered keys equal to, or a prefix of, the candidate.
        let mut node = ROOT;
        let mut depth = 0;
        let mut reached_end = true;
        for c in key.as_str().chars() {
            match self.nodes[node].children.get(&c) {
                Some(&next) => node = next,
                None => {
                    reached_end = false;
                    break;
                }
            }
            depth += 1;
            if depth == key_len || depth >= self.min_prefix_length {
                self.note_terminal(node, depth, &mut best);
            }
        }

        // Registered keys that extend the candidate.
        if reached_end && key_len >= self.min_prefix_length {
            for child in self.nodes[node].children.values() {
                self.note_subtree(*child, key_len, &mut best);
            }
        }

        // Same again for a candidate that carries a truncation ellipsis.
        if let Some(stem) = truncation_stem(key) {
            let stem_len = stem.chars().count();
            if stem_len >= self.min_prefix_length {
                if let Some(stem_node) = self.walk(stem) {
                    self.note_subtree(stem_node, stem_len, &mut best);
                }
            }
        }

        let mut matches: Vec<CandidateMatch> = best
            .into_iter()
            .map(|(id, len)| CandidateMatch {
                parent_task_id: id.to_string(),
                matched_prefix_length: len,
            })
            .collect();
        matches.sort_by(|a, b| {
            b.matched_prefix_length
                .cmp(&a.matched_prefix_length)
                .then_with(|| a.parent_task_id.cmp(&b.parent_task_id))
        });
        matches
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_nodes: self.total_keys,
            total_instructions: self.total_instructions,
        }
    }

    fn walk(&self, s: &str) -> Option<NodeId> {
        s.chars()
            .try_fold(ROOT, |node, c| self.nodes[node].children.get(&c).copied())
    }

    fn note_terminal<'a>(&'a self, node: NodeId, len: usize, best: &mut HashMap<&'a str, usize>) {
        for id in &self.nodes[node].task_ids {
            let slot = best.entry(id.as_str()).or_insert(0);
            *slot = (*slot).max(len);
        }
    }

    fn note_subtree<'a>(&'a self, root: NodeId, len: usize, best: &mut HashMap<&'a str, usize>) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            self.note_terminal(node, len, best);
            stack.extend(self.nodes[node].children.values().copied());
        }
    }
}
