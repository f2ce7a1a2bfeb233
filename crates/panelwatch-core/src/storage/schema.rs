/// Base table as first shipped. Never edited; later columns arrive through [`MIGRATIONS`].
pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS analyses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  created_at TEXT NOT NULL,
  source_url TEXT NOT NULL,
  artifact_path TEXT NOT NULL,
  prompt_version TEXT NOT NULL,
  model_endpoint TEXT NOT NULL,
  raw_output TEXT NOT NULL,
  structured_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at);
"#;

/// An additive schema step. Columns must be nullable so older rows stay valid.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
}

/// Applied in order; `PRAGMA user_version` records the last one.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "artifact_list_context_parse_flag",
        table: "analyses",
        columns: &[
            ("artifacts_json", "TEXT"),
            ("context_json", "TEXT"),
            ("parse_ok", "INTEGER"),
        ],
    },
    Migration {
        version: 2,
        name: "model_name_duration",
        table: "analyses",
        columns: &[("model_name", "TEXT"), ("duration_ms", "INTEGER")],
    },
];

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
