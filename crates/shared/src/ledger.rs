//! Persistent ledger of rename decisions and resolved series metadata.
//!
//! This module provides a high-level API over the SQLite database: looking up
//! and recording which chapters have already been renamed into the library,
//! and caching the metadata resolved for each series.

use crate::models::*;
use crate::Database;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

/// Column a metadata lookup matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataLookup {
    SearchValue,
    SeriesTitle,
    EnglishTitle,
    JapaneseTitle,
}

impl MetadataLookup {
    /// Every lookup, in the order they should be tried
    pub const ALL: [MetadataLookup; 4] = [
        MetadataLookup::SearchValue,
        MetadataLookup::SeriesTitle,
        MetadataLookup::EnglishTitle,
        MetadataLookup::JapaneseTitle,
    ];

    fn column(&self) -> &'static str {
        match self {
            MetadataLookup::SearchValue => "search_value",
            MetadataLookup::SeriesTitle => "series_title",
            MetadataLookup::EnglishTitle => "series_title_eng",
            MetadataLookup::JapaneseTitle => "series_title_jap",
        }
    }
}

const METADATA_COLUMNS: &str = "id, search_value, series_title, series_title_eng, series_title_jap,
    alternate_titles, status, kind, description, staff, genres, serializations,
    publish_date, page_count, url, source, source_id, scraped_at";

/// Ledger over the tagger database
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Create a new ledger with the given database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Normalize a chapter number into its record key (`12.5` -> `12-5`)
    pub fn chapter_key(chapter_number: &str) -> String {
        chapter_number.replace('.', "-")
    }

    /// Find the rename decision recorded for a series chapter
    pub fn find_processed_file(
        &self,
        series_title: &str,
        chapter_number: &str,
    ) -> Result<Option<ProcessedFileRecord>> {
        let conn = self.db.conn();

        let record = conn
            .query_row(
                "SELECT id, series_title, chapter_number, original_filename, target_filename,
                        created_at, updated_at
                 FROM processed_files
                 WHERE series_title = ?1 AND chapter_number = ?2",
                params![series_title, Self::chapter_key(chapter_number)],
                row_to_processed_file,
            )
            .optional()
            .context("Failed to query processed files")?;

        debug!(
            series_title = series_title,
            chapter_number = chapter_number,
            found = record.is_some(),
            "Looked up processed file"
        );

        Ok(record)
    }

    /// Record a first-time rename decision
    pub fn insert_processed_file(&mut self, file: &NewProcessedFile) -> Result<i64> {
        let conn = self.db.conn_mut();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO processed_files (
                series_title, chapter_number, original_filename, target_filename,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.series_title,
                Self::chapter_key(&file.chapter_number),
                file.original_filename,
                file.target_filename,
                now,
                now,
            ],
        )
        .context("Failed to insert processed file")?;

        let id = conn.last_insert_rowid();
        info!(
            record_id = id,
            series_title = %file.series_title,
            chapter_number = %file.chapter_number,
            target_filename = %file.target_filename,
            "Recorded processed file"
        );

        Ok(id)
    }

    /// Point an existing record at a newer revision of the chapter
    pub fn update_processed_file(
        &mut self,
        id: i64,
        original_filename: &str,
        target_filename: &str,
    ) -> Result<()> {
        let conn = self.db.conn_mut();

        let updated = conn
            .execute(
                "UPDATE processed_files
                 SET original_filename = ?1, target_filename = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![original_filename, target_filename, Utc::now(), id],
            )
            .context("Failed to update processed file")?;

        if updated == 0 {
            anyhow::bail!("No processed file with id {}", id);
        }

        debug!(record_id = id, target_filename = target_filename, "Updated processed file");

        Ok(())
    }

    /// Find stored metadata for a title, trying each lookup in order
    pub fn find_metadata(
        &self,
        title: &str,
        lookups: &[MetadataLookup],
    ) -> Result<Option<ResolvedMetadata>> {
        let conn = self.db.conn();

        for lookup in lookups {
            let sql = format!(
                "SELECT {} FROM manga_metadata WHERE {} = ?1 ORDER BY id LIMIT 1",
                METADATA_COLUMNS,
                lookup.column()
            );

            let found = conn
                .query_row(&sql, params![title], row_to_metadata)
                .optional()
                .with_context(|| format!("Failed to query metadata by {}", lookup.column()))?;

            if let Some(metadata) = found {
                debug!(title = title, lookup = ?lookup, "Metadata found in ledger");
                return Ok(Some(metadata));
            }
        }

        Ok(None)
    }

    /// Store resolved metadata (deduplicated on search value)
    ///
    /// If metadata was already stored under the same search value, return
    /// the existing row ID instead of inserting a second copy.
    pub fn insert_metadata(&mut self, metadata: &ResolvedMetadata) -> Result<i64> {
        let conn = self.db.conn_mut();

        let existing_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM manga_metadata WHERE search_value = ?1",
                params![metadata.search_value],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query for existing metadata")?;

        if let Some(id) = existing_id {
            debug!(search_value = %metadata.search_value, db_id = id, "Metadata already exists");
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO manga_metadata (
                search_value, series_title, series_title_eng, series_title_jap,
                alternate_titles, status, kind, description,
                staff, genres, serializations,
                publish_date, page_count, url,
                source, source_id, scraped_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17
            )",
            params![
                metadata.search_value,
                metadata.series_title,
                metadata.series_title_eng,
                metadata.series_title_jap,
                serde_json::to_string(&metadata.alternate_titles)?,
                metadata.status,
                metadata.kind,
                metadata.description,
                serde_json::to_string(&metadata.staff)?,
                serde_json::to_string(&metadata.genres)?,
                serde_json::to_string(&metadata.serializations)?,
                metadata.publish_date,
                metadata.page_count,
                metadata.url,
                metadata.source.as_str(),
                metadata.source_id,
                metadata.scraped_at,
            ],
        )
        .context("Failed to insert metadata")?;

        let id = conn.last_insert_rowid();
        info!(
            search_value = %metadata.search_value,
            series_title = %metadata.series_title,
            source = %metadata.source,
            db_id = id,
            "Stored series metadata"
        );

        Ok(id)
    }

    /// Every stored metadata row (used to seed the resolved-series set)
    pub fn all_metadata(&self) -> Result<Vec<ResolvedMetadata>> {
        let conn = self.db.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM manga_metadata ORDER BY id",
            METADATA_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], row_to_metadata)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Get ledger statistics
    pub fn stats(&self) -> Result<LedgerStats> {
        let conn = self.db.conn();

        let processed_files: i64 =
            conn.query_row("SELECT COUNT(*) FROM processed_files", [], |row| row.get(0))?;
        let series: i64 =
            conn.query_row("SELECT COUNT(*) FROM manga_metadata", [], |row| row.get(0))?;

        Ok(LedgerStats {
            processed_files: processed_files as usize,
            series: series as usize,
        })
    }
}

/// Helper: Convert a database row to a ProcessedFileRecord
fn row_to_processed_file(row: &rusqlite::Row) -> rusqlite::Result<ProcessedFileRecord> {
    Ok(ProcessedFileRecord {
        id: row.get(0)?,
        series_title: row.get(1)?,
        chapter_number: row.get(2)?,
        original_filename: row.get(3)?,
        target_filename: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Helper: Convert a database row to ResolvedMetadata
fn row_to_metadata(row: &rusqlite::Row) -> rusqlite::Result<ResolvedMetadata> {
    let source: String = row.get(15)?;
    let source: CatalogSource = source.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(15, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(ResolvedMetadata {
        id: row.get(0)?,
        search_value: row.get(1)?,
        series_title: row.get(2)?,
        series_title_eng: row.get(3)?,
        series_title_jap: row.get(4)?,
        alternate_titles: json_column(row, 5)?,
        status: row.get(6)?,
        kind: row.get(7)?,
        description: row.get(8)?,
        staff: json_column(row, 9)?,
        genres: json_column(row, 10)?,
        serializations: json_column(row, 11)?,
        publish_date: row.get(12)?,
        page_count: row.get(13)?,
        url: row.get(14)?,
        source,
        source_id: row.get(16)?,
        scraped_at: row.get(17)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Ledger statistics
#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub processed_files: usize,
    pub series: usize,
}
