use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::hierarchy::Reconstruction;
use crate::model::{CandidateMatch, ParentLink, TaskRecord};

const PREVIEW_CHARS: usize = 60;

#[derive(Serialize)]
pub struct TaskDetail<'a> {
    #[serde(flatten)]
    pub task: &'a TaskRecord,
    pub parent: Option<&'a ParentLink>,
    pub children: &'a [String],
}

/// First line of an instruction, cut for one-line display.
fn preview(instruction: &str) -> String {
    let first = instruction.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first.chars().count() > PREVIEW_CHARS {
        let cut: String = first.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        first.to_string()
    }
}

pub fn format_task_detail(task: &TaskRecord, parent: Option<&ParentLink>, children: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Id:          {}\n", task.id));
    if let Some(ref ws) = task.workspace {
        out.push_str(&format!("Workspace:   {}\n", ws));
    }
    if let Some(ref at) = task.created_at {
        out.push_str(&format!("Created:     {}\n", at));
    }
    if let Some(link) = parent {
        out.push_str(&format!(
            "Parent:      {} (matched {} chars, {} candidate(s))\n",
            link.parent, link.matched_prefix_length, link.candidates
        ));
    }
    if !children.is_empty() {
        out.push_str(&format!("Children:    {}\n", children.join(", ")));
    }
    out.push_str("\nInstruction:\n");
    for line in task.instruction.lines() {
        out.push_str(&format!("  {line}\n"));
    }
    out
}

pub fn format_candidates(candidates: &[CandidateMatch]) -> String {
    let mut out = String::new();
    for c in candidates {
        out.push_str(&format!("{:>5}  {}\n", c.matched_prefix_length, c.parent_task_id));
    }
    out
}

pub fn format_summary(result: &Reconstruction) -> String {
    let mut out = String::new();
    out.push_str(&format!("Tasks:            {}\n", result.tasks));
    out.push_str(&format!("Sub-instructions: {}\n", result.sub_instructions));
    out.push_str(&format!(
        "Index:            {} keys, {} registrations\n",
        result.stats.total_nodes, result.stats.total_instructions
    ));
    out.push_str(&format!("Links:            {}\n", result.links.len()));
    out.push_str(&format!("Ambiguous:        {}\n", result.ambiguous.len()));
    for amb in &result.ambiguous {
        let ids: Vec<&str> = amb
            .candidates
            .iter()
            .map(|c| c.parent_task_id.as_str())
            .collect();
        out.push_str(&format!("  {} -> {}\n", amb.child, ids.join(" | ")));
    }
    out
}

/// Render tasks as a forest using `links`. With `root`, only that subtree.
pub fn format_task_tree(tasks: &[TaskRecord], links: &[ParentLink], root: Option<&str>) -> String {
    if tasks.is_empty() {
        return String::new();
    }

    let task_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let parents: HashMap<&str, &str> = links
        .iter()
        .filter(|l| task_ids.contains(l.parent.as_str()))
        .map(|l| (l.child.as_str(), l.parent.as_str()))
        .collect();

    let mut children_map: HashMap<Option<&str>, Vec<&TaskRecord>> = HashMap::new();
    for task in tasks {
        let parent_key = parents.get(task.id.as_str()).copied();
        children_map.entry(parent_key).or_default().push(task);
    }

    let roots: Vec<&TaskRecord> = match root {
        Some(id) => tasks.iter().filter(|t| t.id == id).collect(),
        None => children_map.get(&None).cloned().unwrap_or_default(),
    };

    let mut out = String::new();
    for task in &roots {
        write_tree(&mut out, task, &children_map, "", "");
    }
    out
}

/// Write a task line and recurse into children.
/// `line_prefix` goes before this task's id.
/// `child_prefix` is the base prefix for this task's children's tree connectors.
fn write_tree(
    out: &mut String,
    task: &TaskRecord,
    children_map: &HashMap<Option<&str>, Vec<&TaskRecord>>,
    line_prefix: &str,
    child_prefix: &str,
) {
    let desc = preview(&task.instruction);
    if desc.is_empty() {
        out.push_str(&format!("{}{}\n", line_prefix, task.id));
    } else {
        out.push_str(&format!("{}{}  {}\n", line_prefix, task.id, desc));
    }

    let children = children_map
        .get(&Some(task.id.as_str()))
        .cloned()
        .unwrap_or_default();

    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let (connector, extension) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        write_tree(
            out,
            child,
            children_map,
            &format!("{child_prefix}{connector}"),
            &format!("{child_prefix}{extension}"),
        );
    }
}
