//! libSQL-backed persisted segment repo (offline mode).
//!
//! The [`Repo`] accumulates segments across runs. Each merge appends only
//! rows that are not already present; a row is identified by a hash over
//! every field, so partially differing rows are kept side by side.
//!
//! **Access rules:**
//! - `cultureseg process --repo`: read-write via [`Repo::open`]
//! - `cultureseg repo show|export`: read-only via [`Repo::open_readonly`]
//!
//! Concurrent writers are not coordinated. Callers that may run in parallel
//! must serialize merges externally.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, Row, Value, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use cultureseg_core::merge_into_repo;
use cultureseg_shared::{Confidence, Result, RunId, Segment, SegmentId, SegmenterError};

/// Column list shared by reads and writes, in table order.
const SEGMENT_COLUMNS: &str = "segment_id, run_id, source_file, title, content, tags_json, \
     summary, summary_quality_score, confidence_score, needs_attention, title_lang";

/// Row counts reported by [`Repo::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows present before the merge.
    pub existing: usize,
    /// Rows appended by this merge.
    pub inserted: usize,
    /// Rows present after the merge.
    pub total: usize,
}

/// Persisted segment repo wrapping a libSQL database.
pub struct Repo {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> SegmenterError {
    SegmenterError::Storage(e.to_string())
}

impl Repo {
    /// Open or create a repo at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SegmenterError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let repo = Self {
            db,
            conn,
            readonly: false,
        };
        repo.run_migrations().await?;
        Ok(repo)
    }

    /// Open an existing repo at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SegmenterError::Storage(format!(
                "repo not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SegmenterError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SegmenterError::Storage(
                "repo is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All rows, in the order they were merged.
    pub async fn rows(&self) -> Result<Vec<Segment>> {
        let sql = format!("SELECT {SEGMENT_COLUMNS} FROM segments ORDER BY position");
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_segment(&row)?);
        }
        Ok(results)
    }

    /// Number of rows in the repo.
    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM segments", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Append `new_rows`, skipping exact duplicates of any row already kept.
    ///
    /// Existing rows are never reordered or rewritten. All inserts happen in
    /// one transaction.
    #[instrument(skip_all, fields(new_rows = new_rows.len()))]
    pub async fn merge(&self, new_rows: &[Segment]) -> Result<MergeStats> {
        self.check_writable()?;

        let existing = self.rows().await?;
        let merged = merge_into_repo(&existing, new_rows);
        let appended = &merged[existing.len()..];

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let merged_at = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT OR IGNORE INTO segments (row_hash, {SEGMENT_COLUMNS}, merged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );

        for seg in appended {
            let tags_json = seg
                .tags
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(storage_err)?;

            tx.execute(
                &sql,
                params![
                    row_hash(seg)?,
                    seg.segment_id.as_ref().map(ToString::to_string),
                    seg.run_id.as_ref().map(|r| r.as_str().to_string()),
                    seg.source_file.as_deref(),
                    seg.title.as_str(),
                    seg.content.as_str(),
                    tags_json,
                    seg.summary.as_deref(),
                    seg.summary_quality_score.map(|c| c.as_str()),
                    seg.confidence_score.map(|c| c.as_str()),
                    seg.needs_attention.map(i64::from),
                    seg.title_lang.as_deref(),
                    merged_at.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;

        let stats = MergeStats {
            existing: existing.len(),
            inserted: appended.len(),
            total: merged.len(),
        };
        info!(
            existing = stats.existing,
            inserted = stats.inserted,
            total = stats.total,
            "repo merged"
        );
        Ok(stats)
    }
}

/// Stable identity of a row: SHA-256 over its JSON form.
fn row_hash(seg: &Segment) -> Result<String> {
    let json = serde_json::to_string(seg).map_err(storage_err)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn column_type_err(row: &Row, idx: i32, expected: &str, got: &Value) -> SegmenterError {
    SegmenterError::Storage(format!(
        "column {} holds {got:?}, expected {expected} or NULL",
        row.column_name(idx).unwrap_or("?")
    ))
}

/// Nullable TEXT column. Only NULL maps to `None`.
fn opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx).map_err(storage_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(column_type_err(row, idx, "text", &other)),
    }
}

/// Nullable INTEGER column read as a flag.
fn opt_flag(row: &Row, idx: i32) -> Result<Option<bool>> {
    match row.get_value(idx).map_err(storage_err)? {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(v != 0)),
        other => Err(column_type_err(row, idx, "integer", &other)),
    }
}

fn opt_confidence(row: &Row, idx: i32) -> Result<Option<Confidence>> {
    opt_text(row, idx)?
        .map(|s| s.parse::<Confidence>().map_err(SegmenterError::parse))
        .transpose()
}

/// Convert a `segments` row to a [`Segment`].
fn row_to_segment(row: &Row) -> Result<Segment> {
    let segment_id = opt_text(row, 0)?
        .map(|s| {
            s.parse::<SegmentId>()
                .map_err(|e| SegmenterError::parse(format!("invalid segment_id '{s}': {e}")))
        })
        .transpose()?;

    let tags = opt_text(row, 5)?
        .map(|s| {
            serde_json::from_str::<Vec<String>>(&s)
                .map_err(|e| SegmenterError::parse(format!("invalid tags '{s}': {e}")))
        })
        .transpose()?;

    let mut seg = Segment::new(
        row.get::<String>(3).map_err(storage_err)?,
        row.get::<String>(4).map_err(storage_err)?,
    );
    seg.segment_id = segment_id;
    seg.run_id = opt_text(row, 1)?.map(RunId);
    seg.source_file = opt_text(row, 2)?;
    seg.tags = tags;
    seg.summary = opt_text(row, 6)?;
    seg.summary_quality_score = opt_confidence(row, 7)?;
    seg.confidence_score = opt_confidence(row, 8)?;
    seg.needs_attention = opt_flag(row, 9)?;
    seg.title_lang = opt_text(row, 10)?;

    debug!(title = %seg.title, "loaded repo row");
    Ok(seg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cs_test_{}.db", Uuid::now_v7()))
    }

    fn full_segment(title: &str, content: &str) -> Segment {
        let mut seg = Segment::new(title, content);
        seg.segment_id = Some(SegmentId::new());
        seg.run_id = Some(RunId::from("20250101_120000"));
        seg.source_file = Some("profiles.txt".into());
        seg.tags = Some(vec!["kinship".into(), "ritual".into()]);
        seg.summary = Some("Short".into());
        seg.confidence_score = Some(Confidence::Medium);
        seg.needs_attention = Some(true);
        seg.title_lang = Some("und".into());
        seg
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let repo = Repo::open(&temp_path()).await.expect("open repo");
        let version = repo.get_schema_version().await;
        assert_eq!(version, 1);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rows_roundtrip_every_field() {
        let repo = Repo::open(&temp_path()).await.unwrap();
        let mut bare = Segment::new("BASQUE", "Pyrenees");
        bare.summary_quality_score = Some(Confidence::Low);
        let batch = vec![full_segment("AINU", "Hokkaido\nSakhalin"), bare];

        repo.merge(&batch).await.expect("merge");
        assert_eq!(repo.rows().await.unwrap(), batch);
    }

    #[tokio::test]
    async fn merge_twice_is_idempotent() {
        let repo = Repo::open(&temp_path()).await.unwrap();
        let batch = vec![full_segment("AINU", "a"), full_segment("BASQUE", "b")];

        let first = repo.merge(&batch).await.unwrap();
        assert_eq!(
            first,
            MergeStats {
                existing: 0,
                inserted: 2,
                total: 2
            }
        );

        let second = repo.merge(&batch).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.total, 2);
        assert_eq!(repo.rows().await.unwrap(), batch);
    }

    #[tokio::test]
    async fn merge_appends_after_existing_rows() {
        let repo = Repo::open(&temp_path()).await.unwrap();
        let old = full_segment("AINU", "Hokkaido");
        let mut changed = old.clone();
        changed.content = "Sakhalin".into();

        repo.merge(std::slice::from_ref(&old)).await.unwrap();
        let stats = repo.merge(&[changed.clone(), old.clone()]).await.unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(repo.rows().await.unwrap(), vec![old, changed]);
    }

    #[tokio::test]
    async fn merge_with_empty_batch() {
        let repo = Repo::open(&temp_path()).await.unwrap();
        repo.merge(&[full_segment("AINU", "a")]).await.unwrap();
        let stats = repo.merge(&[]).await.unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_path();
        let rw = Repo::open(&tmp).await.unwrap();
        rw.merge(&[full_segment("AINU", "a")]).await.unwrap();
        drop(rw);

        let ro = Repo::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.rows().await.unwrap().len(), 1);
        let result = ro.merge(&[full_segment("BASQUE", "b")]).await;
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_missing_repo_fails() {
        let result = Repo::open_readonly(&temp_path()).await;
        assert!(matches!(result, Err(SegmenterError::Storage(_))));
    }

    #[tokio::test]
    async fn mistyped_column_is_storage_error() {
        let repo = Repo::open(&temp_path()).await.unwrap();
        repo.conn
            .execute(
                "INSERT INTO segments (row_hash, title, content, title_lang, merged_at)
                 VALUES ('h1', 'AINU', 'Hokkaido', X'00FF', '2025-01-01T00:00:00Z')",
                params![],
            )
            .await
            .unwrap();

        let err = repo.rows().await.unwrap_err();
        assert!(matches!(err, SegmenterError::Storage(_)), "{err}");
        assert!(err.to_string().contains("title_lang"), "{err}");
    }

    #[tokio::test]
    async fn null_columns_read_as_none() {
        let repo = Repo::open(&temp_path()).await.unwrap();
        repo.conn
            .execute(
                "INSERT INTO segments (row_hash, title, content, merged_at)
                 VALUES ('h1', 'AINU', '', '2025-01-01T00:00:00Z')",
                params![],
            )
            .await
            .unwrap();

        let rows = repo.rows().await.unwrap();
        assert_eq!(rows, [Segment::new("AINU", "")]);
    }

    #[test]
    fn row_hash_changes_with_any_field() {
        let a = full_segment("AINU", "a");
        let mut b = a.clone();
        assert_eq!(row_hash(&a).unwrap(), row_hash(&b).unwrap());
        b.needs_attention = Some(false);
        assert_ne!(row_hash(&a).unwrap(), row_hash(&b).unwrap());
    }
}
