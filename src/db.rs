use rusqlite::Connection;
use std::path::Path;

/// Open (creating if needed) the workspace database. Students are stored as
/// whole JSON documents; everything structured lives inside `doc`, which is
/// what lets the normalization engine see legacy keys the schema no longer
/// declares.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("alunos.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    // Early workspaces predate the timestamp columns.
    ensure_students_timestamps(&conn)?;

    Ok(conn)
}

fn ensure_students_timestamps(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "created_at")? {
        conn.execute("ALTER TABLE students ADD COLUMN created_at TEXT", [])?;
    }
    if !table_has_column(conn, "students", "updated_at")? {
        conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
