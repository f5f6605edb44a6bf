use std::io::BufRead;

use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::{Connection, OptionalExtension};

use crate::hierarchy::{reconstruct, Lineage, Reconstruction, TieBreak};
use crate::matcher::{HierarchyMatcher, MatchConfig};
use crate::model::{CandidateMatch, ParentLink, TaskRecord};
use crate::validate::validate_task_id;

const TASK_COLUMNS: &str = "id, instruction, workspace, created_at";

const UPSERT_TASK: &str = "
INSERT INTO tasks (id, instruction, workspace, created_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(id) DO UPDATE SET
    instruction = excluded.instruction,
    workspace = excluded.workspace,
    created_at = excluded.created_at,
    imported_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
";

fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        instruction: row.get(1)?,
        workspace: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn read_link_row(row: &rusqlite::Row) -> rusqlite::Result<ParentLink> {
    Ok(ParentLink {
        child: row.get(0)?,
        parent: row.get(1)?,
        matched_prefix_length: row.get(2)?,
        candidates: row.get(3)?,
    })
}

fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks WHERE id = ?1", [id], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

fn require_task(conn: &Connection, id: &str) -> Result<()> {
    if !task_exists(conn, id)? {
        bail!("task '{id}' not found");
    }
    Ok(())
}

/// Parse JSON Lines task records. Blank lines are skipped.
pub fn parse_jsonl(reader: impl BufRead) -> Result<Vec<TaskRecord>> {
    let mut tasks = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", n + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let task: TaskRecord = serde_json::from_str(&line)
            .with_context(|| format!("invalid task record on line {}", n + 1))?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Insert or replace tasks. Returns how many were written.
pub fn import_tasks(conn: &Connection, tasks: &[TaskRecord]) -> Result<usize> {
    for task in tasks {
        validate_task_id(&task.id)?;
    }
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(UPSERT_TASK)?;
        for task in tasks {
            stmt.execute(rusqlite::params![
                task.id,
                task.instruction,
                task.workspace,
                task.created_at
            ])?;
        }
    }
    tx.commit()?;
    Ok(tasks.len())
}

pub fn get_task(conn: &Connection, id: &str) -> Result<TaskRecord> {
    require_task(conn, id)?;
    let task = conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        [id],
        read_task_row,
    )?;
    Ok(task)
}

pub fn load_tasks(conn: &Connection) -> Result<Vec<TaskRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at IS NULL, created_at, id"
    ))?;
    let rows = stmt.query_map([], read_task_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// Replace all stored links with `links`.
pub fn save_links(conn: &Connection, links: &[ParentLink]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM task_parents", [])?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO task_parents (child, parent, matched_prefix_length, candidates)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for link in links {
            stmt.execute(rusqlite::params![
                link.child,
                link.parent,
                link.matched_prefix_length,
                link.candidates
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn list_links(conn: &Connection) -> Result<Vec<ParentLink>> {
    let mut stmt = conn.prepare(
        "SELECT child, parent, matched_prefix_length, candidates FROM task_parents ORDER BY parent, child",
    )?;
    let rows = stmt.query_map([], read_link_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

pub fn parent_of(conn: &Connection, id: &str) -> Result<Option<ParentLink>> {
    let link = conn
        .query_row(
            "SELECT child, parent, matched_prefix_length, candidates FROM task_parents WHERE child = ?1",
            [id],
            read_link_row,
        )
        .optional()?;
    Ok(link)
}

pub fn children_of(conn: &Connection, id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT child FROM task_parents WHERE parent = ?1 ORDER BY child")?;
    let rows = stmt.query_map([id], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// Run one reconstruction pass over the stored corpus and persist its links.
pub fn rebuild(conn: &Connection, config: &MatchConfig, policy: TieBreak) -> Result<Reconstruction> {
    let tasks = load_tasks(conn)?;
    let result = reconstruct(&tasks, config, policy);
    save_links(conn, &result.links)?;
    info!(
        "saved {} link(s) (max_length={}, tie_break={policy})",
        result.links.len(),
        config.max_length
    );
    Ok(result)
}

/// Raw candidate parents for one stored task, before any tie-break.
pub fn candidates_for(conn: &Connection, id: &str, config: &MatchConfig) -> Result<Vec<CandidateMatch>> {
    let child = get_task(conn, id)?;
    let mut matcher = HierarchyMatcher::new(config.clone());
    for task in load_tasks(conn)? {
        matcher.add_parent_task_with_sub_instructions(&task.id, &task.instruction);
    }
    Ok(matcher.resolve_parent(&child.id, &child.instruction, &Lineage::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn record(id: &str, instruction: &str, created_at: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            instruction: instruction.to_string(),
            workspace: None,
            created_at: Some(created_at.to_string()),
        }
    }

    fn seed(conn: &Connection) {
        let tasks = vec![
            record(
                "P",
                "1. Spawn with message: \"A1: do X\"\n2. Spawn with message: \"A2: do Y\"",
                "2025-01-01T00:00:00Z",
            ),
            record("C1", "A1: do X", "2025-01-01T00:01:00Z"),
            record("C2", "A2: do Y", "2025-01-01T00:02:00Z"),
            record("C3", "B1: do Z", "2025-01-01T00:03:00Z"),
        ];
        import_tasks(conn, &tasks).unwrap();
    }

    #[test]
    fn parse_jsonl_records() {
        let input = "{\"id\":\"a\",\"instruction\":\"do it\"}\n\n\
                     {\"id\":\"b\",\"instruction\":\"x\",\"workspace\":\"/w\",\"created_at\":\"2025-01-01T00:00:00Z\"}\n";
        let tasks = parse_jsonl(input.as_bytes()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].workspace, None);
        assert_eq!(tasks[1].workspace.as_deref(), Some("/w"));
    }

    #[test]
    fn parse_jsonl_reports_line() {
        let err = parse_jsonl("{\"id\":\"a\",\"instruction\":\"\"}\nnot json\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn import_and_get_task() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let task = get_task(&conn, "C1").unwrap();
        assert_eq!(task.instruction, "A1: do X");
        assert!(get_task(&conn, "missing").is_err());
    }

    #[test]
    fn import_replaces_existing() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        import_tasks(&conn, &[record("C1", "changed", "2025-01-05T00:00:00Z")]).unwrap();
        assert_eq!(get_task(&conn, "C1").unwrap().instruction, "changed");
        assert_eq!(load_tasks(&conn).unwrap().len(), 4);
    }

    #[test]
    fn import_rejects_bad_ids() {
        let conn = db::open_memory().unwrap();
        assert!(import_tasks(&conn, &[record("", "x", "2025-01-01T00:00:00Z")]).is_err());
        assert!(load_tasks(&conn).unwrap().is_empty());
    }

    #[test]
    fn load_orders_by_creation() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let ids: Vec<String> = load_tasks(&conn).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["P", "C1", "C2", "C3"]);
    }

    #[test]
    fn rebuild_persists_links() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let result = rebuild(&conn, &MatchConfig::default(), TieBreak::Newest).unwrap();
        assert_eq!(result.links.len(), 2);

        let links = list_links(&conn).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(parent_of(&conn, "C1").unwrap().unwrap().parent, "P");
        assert!(parent_of(&conn, "C3").unwrap().is_none());
        assert_eq!(children_of(&conn, "P").unwrap(), vec!["C1", "C2"]);
    }

    #[test]
    fn rebuild_replaces_previous_links() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        rebuild(&conn, &MatchConfig::default(), TieBreak::Newest).unwrap();
        import_tasks(&conn, &[record("C2", "unrelated now", "2025-01-01T00:02:00Z")]).unwrap();
        rebuild(&conn, &MatchConfig::default(), TieBreak::Newest).unwrap();
        assert_eq!(children_of(&conn, "P").unwrap(), vec!["C1"]);
    }

    #[test]
    fn candidates_for_task() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let found = candidates_for(&conn, "C2", &MatchConfig::default()).unwrap();
        assert_eq!(
            found,
            vec![CandidateMatch {
                parent_task_id: "P".into(),
                matched_prefix_length: 8
            }]
        );
        assert!(candidates_for(&conn, "C3", &MatchConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn links_cascade_on_task_delete() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        rebuild(&conn, &MatchConfig::default(), TieBreak::Newest).unwrap();
        conn.execute("DELETE FROM tasks WHERE id = 'C1'", []).unwrap();
        assert_eq!(list_links(&conn).unwrap().len(), 1);
    }
}
