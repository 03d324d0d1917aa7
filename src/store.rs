//! Document-store boundary. The normalization engine and the bulk importer
//! only ever see `DocumentStore`; the SQLite implementation below is the one
//! real backend, and tests substitute failing stores through the same trait.

use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use uuid::Uuid;

pub struct StoredDoc {
    pub id: String,
    pub doc: Map<String, Value>,
}

/// A partial-update instruction: set these keys, then unset those. One
/// `DocUpdate` maps to one write against the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocUpdate {
    pub set: Map<String, Value>,
    pub unset: Vec<String>,
}

impl DocUpdate {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

/// Apply a partial update to an in-memory document. Sets first, then unsets,
/// so an update may move a value out of a legacy key in one instruction.
pub fn apply_to_doc(doc: &mut Map<String, Value>, update: &DocUpdate) {
    for (k, v) in &update.set {
        doc.insert(k.clone(), v.clone());
    }
    for k in &update.unset {
        doc.remove(k);
    }
}

pub trait DocumentStore {
    fn fetch_all(&self) -> anyhow::Result<Vec<StoredDoc>>;
    fn apply(&mut self, id: &str, update: &DocUpdate) -> anyhow::Result<()>;
    fn insert_batch(&mut self, docs: &[Map<String, Value>]) -> anyhow::Result<usize>;
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn fetch_all(conn: &Connection) -> anyhow::Result<Vec<StoredDoc>> {
    let mut stmt = conn.prepare("SELECT id, doc FROM students ORDER BY id")?;
    let rows = stmt.query_map([], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        let doc: Map<String, Value> = serde_json::from_str(&raw)?;
        out.push(StoredDoc { id, doc });
    }
    Ok(out)
}

pub fn fetch_doc(conn: &Connection, id: &str) -> anyhow::Result<Option<StoredDoc>> {
    let raw: Option<String> = conn
        .query_row("SELECT doc FROM students WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    match raw {
        Some(raw) => {
            let doc: Map<String, Value> = serde_json::from_str(&raw)?;
            Ok(Some(StoredDoc {
                id: id.to_string(),
                doc,
            }))
        }
        None => Ok(None),
    }
}

pub fn insert_doc(conn: &Connection, doc: &Map<String, Value>) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    let ts = now();
    conn.execute(
        "INSERT INTO students(id, doc, created_at, updated_at) VALUES (?, ?, ?, ?)",
        (&id, &serde_json::to_string(doc)?, &ts, &ts),
    )?;
    Ok(id)
}

pub fn replace_doc(conn: &Connection, id: &str, doc: &Map<String, Value>) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE students SET doc = ?, updated_at = ? WHERE id = ?",
        (&serde_json::to_string(doc)?, &now(), id),
    )?;
    Ok(n > 0)
}

pub fn delete_doc(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM students WHERE id = ?", [id])?;
    Ok(n > 0)
}

/// SQLite-backed `DocumentStore`. `apply` is a read-modify-write on a single
/// row; the sidecar is the only writer, so no locking beyond SQLite's own.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteStore { conn }
    }
}

impl DocumentStore for SqliteStore<'_> {
    fn fetch_all(&self) -> anyhow::Result<Vec<StoredDoc>> {
        fetch_all(self.conn)
    }

    fn apply(&mut self, id: &str, update: &DocUpdate) -> anyhow::Result<()> {
        let Some(mut stored) = fetch_doc(self.conn, id)? else {
            anyhow::bail!("student {} not found", id);
        };
        apply_to_doc(&mut stored.doc, update);
        if !replace_doc(self.conn, id, &stored.doc)? {
            anyhow::bail!("student {} vanished during update", id);
        }
        Ok(())
    }

    fn insert_batch(&mut self, docs: &[Map<String, Value>]) -> anyhow::Result<usize> {
        let ts = now();
        let tx_guard = self.conn.unchecked_transaction()?;
        let mut inserted = 0usize;
        for doc in docs {
            let id = Uuid::new_v4().to_string();
            tx_guard.execute(
                "INSERT INTO students(id, doc, created_at, updated_at) VALUES (?, ?, ?, ?)",
                (&id, &serde_json::to_string(doc)?, &ts, &ts),
            )?;
            inserted += 1;
        }
        tx_guard.commit()?;
        Ok(inserted)
    }
}
