use crate::store::{BatchOp, Collection, DocKey, DocumentStore, StoreError, WriteBatch};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<SqliteStore> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY(collection, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;

    // Workspaces created before write timestamps were tracked lack updated_at.
    ensure_documents_updated_at(&conn)?;

    Ok(SqliteStore { conn })
}

fn ensure_documents_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "documents", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE documents ADD COLUMN updated_at TEXT", [])?;
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

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Document store over a single SQLite table.
pub struct SqliteStore {
    conn: Connection,
}

fn upsert(conn: &Connection, key: &DocKey, value: &Value) -> Result<(), StoreError> {
    let body = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO documents(collection, id, body, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(collection, id) DO UPDATE SET
           body = excluded.body,
           updated_at = excluded.updated_at",
        (key.collection.as_str(), &key.id, body, now_stamp()),
    )?;
    Ok(())
}

fn remove(conn: &Connection, key: &DocKey) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM documents WHERE collection = ? AND id = ?",
        (key.collection.as_str(), &key.id),
    )?;
    Ok(())
}

impl DocumentStore for SqliteStore {
    fn get(&self, key: &DocKey) -> Result<Option<Value>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ? AND id = ?",
                (key.collection.as_str(), &key.id),
                |r| r.get(0),
            )
            .optional()?;
        match body {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &DocKey, value: &Value) -> Result<(), StoreError> {
        upsert(&self.conn, key, value)
    }

    fn delete(&mut self, key: &DocKey) -> Result<(), StoreError> {
        remove(&self.conn, key)
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM documents WHERE collection = ? ORDER BY id")?;
        let rows = stmt
            .query_map([collection.as_str()], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            out.push((id, serde_json::from_str(&body)?));
        }
        Ok(out)
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => upsert(&tx, &key, &value)?,
                BatchOp::Delete(key) => remove(&tx, &key)?,
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn batch_commit_applies_puts_and_deletes_together() {
        let ws = temp_dir("gradebook-db-batch");
        let mut store = open_db(&ws).expect("open db");
        let a = DocKey::new(Collection::Students, "a");
        let b = DocKey::new(Collection::Marks, "a");
        store.put(&a, &json!({ "name": "Ada" })).expect("put");

        let mut batch = WriteBatch::new();
        batch.delete(a.clone()).put(b.clone(), json!({ "firstSequence": {} }));
        store.commit(batch).expect("commit");

        assert_eq!(store.get(&a).expect("get"), None);
        assert_eq!(
            store.get(&b).expect("get"),
            Some(json!({ "firstSequence": {} }))
        );
        assert_eq!(store.list(Collection::Marks).expect("list").len(), 1);
    }

    #[test]
    fn reopen_keeps_documents_and_adds_timestamp_column() {
        let ws = temp_dir("gradebook-db-reopen");
        {
            let mut store = open_db(&ws).expect("open db");
            store
                .put(&DocKey::new(Collection::Settings, "engine"), &json!({ "passingMark": 12 }))
                .expect("put");
        }
        let store = open_db(&ws).expect("reopen db");
        assert!(table_has_column(&store.conn, "documents", "updated_at").expect("pragma"));
        assert_eq!(
            store
                .get(&DocKey::new(Collection::Settings, "engine"))
                .expect("get"),
            Some(json!({ "passingMark": 12 }))
        );
    }
}
