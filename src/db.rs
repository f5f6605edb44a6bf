use anyhow::Result;
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY CHECK(length(id) > 0),
    instruction TEXT NOT NULL DEFAULT '',
    workspace   TEXT,
    created_at  TEXT,
    imported_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS task_parents (
    child                 TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
    parent                TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    matched_prefix_length INTEGER NOT NULL,
    candidates            INTEGER NOT NULL,
    CHECK (child != parent)
);

CREATE INDEX IF NOT EXISTS task_parents_parent ON task_parents(parent);
";

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    set_pragmas(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    set_pragmas(&conn)?;
    init(&conn)?;
    Ok(conn)
}
