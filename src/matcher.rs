use anyhow::{bail, Result};
use log::debug;

use crate::canonical::{compute_canonical_key, DEFAULT_MAX_LENGTH};
use crate::extract::extract_sub_instructions;
use crate::hierarchy::Lineage;
use crate::index::{PrefixIndex, DEFAULT_MIN_PREFIX_LENGTH};
use crate::model::{CandidateMatch, IndexStats};

/// Knobs shared by registration and lookup within one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    /// Key bound in characters.
    pub max_length: usize,
    /// Shortest shared prefix accepted when keys are not identical.
    pub min_prefix_length: usize,
    /// Register a parent's whole instruction when it quotes no sub-instructions.
    pub full_text_fallback: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            min_prefix_length: DEFAULT_MIN_PREFIX_LENGTH,
            full_text_fallback: false,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            bail!("max_length must be greater than zero");
        }
        Ok(())
    }
}

/// Populates a fresh prefix index from parent instructions and answers
/// parent lookups for children. One matcher serves one corpus.
#[derive(Debug)]
pub struct HierarchyMatcher {
    index: PrefixIndex,
    config: MatchConfig,
}

impl HierarchyMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            index: PrefixIndex::new(config.min_prefix_length),
            config,
        }
    }

    /// Register every sub-instruction quoted in `parent_text` under
    /// `parent_id`. Returns how many new (key, parent) registrations were made;
    /// a literal quoted twice counts once.
    ///
    /// With `full_text_fallback` set, a parent that quotes nothing gets its
    /// whole instruction registered instead. That registration is not counted.
    pub fn add_parent_task_with_sub_instructions(&mut self, parent_id: &str, parent_text: &str) -> usize {
        let mut registered = 0;
        let mut quoted = 0;
        for literal in extract_sub_instructions(parent_text) {
            let key = compute_canonical_key(&literal, self.config.max_length);
            if key.is_empty() {
                continue;
            }
            quoted += 1;
            if self.index.add_instruction(parent_id, &key, Some(&literal)) {
                registered += 1;
            }
        }

        if quoted == 0 && self.config.full_text_fallback {
            let key = compute_canonical_key(parent_text, self.config.max_length);
            if self.index.add_instruction(parent_id, &key, Some(parent_text)) {
                debug!("{parent_id}: no quoted sub-instructions, registered full text");
            }
        }
        registered
    }

    /// Candidate parents for `child_id`, excluding the child itself and any of
    /// its known descendants in `lineage`.
    pub fn resolve_parent(&self, child_id: &str, child_text: &str, lineage: &Lineage) -> Vec<CandidateMatch> {
        let mut matches = self
            .index
            .search_exact_prefix(child_text, self.config.max_length);
        matches.retain(|m| {
            m.parent_task_id != child_id && !lineage.is_descendant(&m.parent_task_id, child_id)
        });
        matches
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }
}
