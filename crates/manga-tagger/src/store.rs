//! Thread-safe handle on the ledger for concurrent chapter tasks.

use anyhow::{anyhow, Result};
use shared::{
    Database, Ledger, LedgerStats, MetadataLookup, NewProcessedFile, ProcessedFileRecord,
    ResolvedMetadata,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Ledger behind a mutex, shared by every chapter task
pub struct Store {
    ledger: Mutex<Ledger>,
}

impl Store {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Ledger::new(Database::open(path)?)))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Ledger::new(Database::open_in_memory()?)))
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger.lock().map_err(|_| anyhow!("Ledger lock poisoned"))
    }

    pub fn find_processed_file(
        &self,
        series_title: &str,
        chapter_number: &str,
    ) -> Result<Option<ProcessedFileRecord>> {
        self.ledger()?.find_processed_file(series_title, chapter_number)
    }

    pub fn insert_processed_file(&self, file: &NewProcessedFile) -> Result<i64> {
        self.ledger()?.insert_processed_file(file)
    }

    pub fn update_processed_file(&self, id: i64, original_filename: &str, target_filename: &str) -> Result<()> {
        self.ledger()?
            .update_processed_file(id, original_filename, target_filename)
    }

    /// Stored metadata for a series, matched on any known title
    pub fn find_metadata(&self, title: &str) -> Result<Option<ResolvedMetadata>> {
        self.ledger()?.find_metadata(title, &MetadataLookup::ALL)
    }

    pub fn insert_metadata(&self, metadata: &ResolvedMetadata) -> Result<i64> {
        self.ledger()?.insert_metadata(metadata)
    }

    /// Stored metadata keyed by the title each series was searched under
    pub fn resolved_series(&self) -> Result<Vec<(String, Arc<ResolvedMetadata>)>> {
        Ok(self
            .ledger()?
            .all_metadata()?
            .into_iter()
            .map(|m| (m.search_value.clone(), Arc::new(m)))
            .collect())
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        self.ledger()?.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::CatalogSource;
    use tempfile::TempDir;

    fn metadata(search_value: &str, series_title: &str) -> ResolvedMetadata {
        ResolvedMetadata {
            id: None,
            search_value: search_value.to_string(),
            series_title: series_title.to_string(),
            series_title_eng: Some("The Monster".to_string()),
            series_title_jap: None,
            alternate_titles: Vec::new(),
            status: None,
            kind: None,
            description: None,
            staff: Default::default(),
            genres: Vec::new(),
            serializations: Vec::new(),
            publish_date: None,
            page_count: None,
            url: None,
            source: CatalogSource::MangaUpdates,
            source_id: Some("9".to_string()),
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn test_store_survives_reopen() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("tagger.db");

        {
            let store = Store::open(&path)?;
            store.insert_metadata(&metadata("monster", "Monster"))?;
            store.insert_processed_file(&NewProcessedFile {
                series_title: "monster".to_string(),
                chapter_number: "1".to_string(),
                original_filename: "Monster 001.cbz".to_string(),
                target_filename: "Chapter 1.cbz".to_string(),
            })?;
        }

        let store = Store::open(&path)?;
        let resolved = store.resolved_series()?;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, "monster");
        assert!(store.find_processed_file("monster", "1")?.is_some());

        let stats = store.stats()?;
        assert_eq!(stats.processed_files, 1);
        assert_eq!(stats.series, 1);
        Ok(())
    }

    #[test]
    fn test_find_metadata_by_any_title() -> Result<()> {
        let store = Store::open_in_memory()?;
        store.insert_metadata(&metadata("monster", "Monster"))?;

        assert!(store.find_metadata("monster")?.is_some());
        assert!(store.find_metadata("Monster")?.is_some());
        assert!(store.find_metadata("The Monster")?.is_some());
        assert!(store.find_metadata("Pluto")?.is_none());
        Ok(())
    }
}
