use crate::model::{AnalysisRecord, NewRecord, RecordSummary, RunContext};
use crate::storage::schema::{self, Migration};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Append-only record store. One connection per process, shared behind a mutex.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

const RECORD_COLUMNS: &str = "id, created_at, source_url, artifact_path, prompt_version, \
     model_endpoint, raw_output, structured_json, artifacts_json, context_json, parse_ok, \
     model_name, duration_ms";

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the base table and run pending migrations. Safe to call repeatedly.
    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::DDL)?;
        let current = user_version(&conn)?;
        for m in schema::MIGRATIONS {
            if m.version <= current {
                continue;
            }
            apply_migration(&conn, m)
                .with_context(|| format!("migration {} ({}) failed", m.version, m.name))?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", m.version))?;
            tracing::info!(
                event = "schema_migrated",
                version = m.version,
                name = m.name
            );
        }
        Ok(())
    }

    pub fn schema_version(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        user_version(&conn)
    }

    pub fn table_columns(&self, table: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn insert_record(&self, rec: &NewRecord) -> anyhow::Result<i64> {
        let first = rec
            .artifact_paths
            .first()
            .ok_or_else(|| anyhow::anyhow!("refusing to persist a record without artifacts"))?;
        let structured = rec
            .structured_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analyses(
                created_at, source_url, artifact_path, prompt_version, model_endpoint,
                raw_output, structured_json, artifacts_json, context_json, parse_ok,
                model_name, duration_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                rec.created_at,
                rec.source_url,
                first,
                rec.prompt_version,
                rec.model_endpoint,
                rec.raw_model_output,
                structured,
                serde_json::to_string(&rec.artifact_paths)?,
                serde_json::to_string(&rec.context)?,
                rec.parse_ok() as i64,
                rec.model_name,
                rec.duration_ms.map(|v| v as i64),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_record(&self, id: i64) -> anyhow::Result<Option<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM analyses WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::normalize).transpose()
    }

    /// Most recent record by capture time.
    pub fn latest_record(&self) -> anyhow::Result<Option<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM analyses ORDER BY created_at DESC, id DESC LIMIT 1",
                    RECORD_COLUMNS
                ),
                [],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::normalize).transpose()
    }

    pub fn recent_records(&self, limit: u32) -> anyhow::Result<Vec<RecordSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, artifact_path, prompt_version
             FROM analyses
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(RecordSummary {
                id: row.get(0)?,
                created_at: row.get(1)?,
                artifact_path: row.get(2)?,
                prompt_version: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn count_records(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM analyses", [], |r| r.get(0))?;
        Ok(n)
    }
}

struct RawRow {
    id: i64,
    created_at: String,
    source_url: String,
    artifact_path: String,
    prompt_version: String,
    model_endpoint: String,
    raw_output: String,
    structured_json: Option<String>,
    artifacts_json: Option<String>,
    context_json: Option<String>,
    parse_ok: Option<i64>,
    model_name: Option<String>,
    duration_ms: Option<i64>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            source_url: row.get(2)?,
            artifact_path: row.get(3)?,
            prompt_version: row.get(4)?,
            model_endpoint: row.get(5)?,
            raw_output: row.get(6)?,
            structured_json: row.get(7)?,
            artifacts_json: row.get(8)?,
            context_json: row.get(9)?,
            parse_ok: row.get(10)?,
            model_name: row.get(11)?,
            duration_ms: row.get(12)?,
        })
    }

    /// Expand JSON columns, filling gaps left by rows written before a migration.
    fn normalize(self) -> anyhow::Result<AnalysisRecord> {
        let structured_result = match self.structured_json.as_deref() {
            Some(s) => Some(
                serde_json::from_str(s)
                    .with_context(|| format!("record {} has corrupt structured_json", self.id))?,
            ),
            None => None,
        };
        let artifact_paths: Vec<String> = match self.artifacts_json.as_deref() {
            Some(s) if !s.trim().is_empty() => serde_json::from_str(s)
                .with_context(|| format!("record {} has corrupt artifacts_json", self.id))?,
            _ => vec![self.artifact_path.clone()],
        };
        let context: RunContext = match self.context_json.as_deref() {
            Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or_default(),
            _ => RunContext::new(),
        };
        let parse_ok = match self.parse_ok {
            Some(flag) => flag == 1,
            None => structured_result.is_some(),
        };

        Ok(AnalysisRecord {
            id: self.id,
            created_at: self.created_at,
            source_url: self.source_url,
            artifact_paths,
            prompt_version: self.prompt_version,
            model_endpoint: self.model_endpoint,
            raw_model_output: self.raw_output,
            structured_result,
            parse_ok,
            context,
            model_name: self.model_name,
            duration_ms: self.duration_ms.map(|v| v as u64),
        })
    }
}

fn user_version(conn: &Connection) -> anyhow::Result<i64> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(v)
}

fn apply_migration(conn: &Connection, m: &Migration) -> anyhow::Result<()> {
    let cols = get_columns(conn, m.table)?;
    for (col, ty) in m.columns {
        add_column_if_missing(conn, &cols, m.table, col, ty)?;
    }
    Ok(())
}

fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}
