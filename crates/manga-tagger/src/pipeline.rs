//! Per-chapter processing: parse, rename, resolve, tag.
//!
//! A chapter's failure never escapes `Pipeline::process`. Duplicates are
//! discarded, unmatched series go to `No Match`, anything else that goes
//! wrong after the file is claimed goes to `Exception`.

use crate::archive::{embed_comicinfo, move_file, move_into, relocate_adult};
use crate::comicinfo::ComicInfo;
use crate::coordinator::{DedupCoordinator, SeriesTicket};
use crate::error::TaggerError;
use crate::intake::FileEvent;
use crate::parser::{self, ParsedName};
use crate::resolver::Resolver;
use crate::store::Store;
use crate::version::{has_version_tag, is_newer};
use anyhow::{Context, Result};
use shared::config::ProcessingConfig;
use shared::{LibraryPaths, NewProcessedFile, ResolvedMetadata};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What happened to one incoming chapter
#[derive(Debug)]
pub enum Outcome {
    /// Renamed into the library and tagged
    Tagged(PathBuf),
    /// No catalog matched; parked in the series' No Match folder
    NoMatch(PathBuf),
    /// Processing failed; parked in the series' Exception folder
    Exception(PathBuf),
    /// Discarded as a duplicate or older revision
    Rejected(TaggerError),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Tagged(path) => write!(f, "tagged {}", path.display()),
            Outcome::NoMatch(path) => write!(f, "no match, moved to {}", path.display()),
            Outcome::Exception(path) => write!(f, "failed, moved to {}", path.display()),
            Outcome::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Shared state for every chapter task
pub struct Pipeline {
    paths: LibraryPaths,
    processing: ProcessingConfig,
    store: Arc<Store>,
    coordinator: DedupCoordinator,
    resolver: Resolver,
}

impl Pipeline {
    pub fn new(
        paths: LibraryPaths,
        processing: ProcessingConfig,
        store: Arc<Store>,
        coordinator: DedupCoordinator,
        resolver: Resolver,
    ) -> Self {
        Self {
            paths,
            processing,
            store,
            coordinator,
            resolver,
        }
    }

    /// Process one incoming chapter
    pub async fn process(&self, event: &FileEvent) -> Outcome {
        let filename = event.filename();
        let span = info_span!("chapter", event_id = event.event_id, original_filename = %filename);
        self.process_chapter(event, filename).instrument(span).await
    }

    async fn process_chapter(&self, event: &FileEvent, filename: String) -> Outcome {
        let parsed = match parser::parse(&filename, event.known_series.as_deref()) {
            Ok(parsed) => parsed,
            Err(e) => {
                let series = event.known_series.clone().unwrap_or_else(|| filename.clone());
                return self.park(&event.path, &series, e.into());
            }
        };

        info!(
            series_title = %parsed.series_title,
            chapter_number = %parsed.chapter_number,
            target_filename = %parsed.target_filename,
            "Processing chapter"
        );

        let current = if self.processing.rename_file {
            match self.rename_into_library(&event.path, &filename, &parsed).await {
                Ok(path) => path,
                Err(e) => {
                    return match e.downcast::<TaggerError>() {
                        Ok(reason) if reason.is_duplicate() => {
                            info!(reason = %reason, "Discarded incoming file");
                            Outcome::Rejected(reason)
                        }
                        Ok(reason) => {
                            let location = self.current_location(&event.path, &parsed);
                            self.park(&location, &parsed.series_title, reason.into())
                        }
                        Err(e) => {
                            let location = self.current_location(&event.path, &parsed);
                            self.park(&location, &parsed.series_title, e)
                        }
                    };
                }
            }
        } else {
            event.path.clone()
        };

        match self.tag(&current, &event.path, &parsed).await {
            Ok(path) => {
                info!(path = %path.display(), "Chapter processed");
                Outcome::Tagged(path)
            }
            Err(e) => self.park(&current, &parsed.series_title, e),
        }
    }

    /// Move a failed chapter into the matching holding folder
    fn park(&self, path: &Path, series_title: &str, error: anyhow::Error) -> Outcome {
        let not_found = matches!(
            error.downcast_ref::<TaggerError>(),
            Some(TaggerError::MangaNotFound(_))
        );

        let dir = if not_found {
            warn!(series_title = series_title, error = %error, "No metadata found for chapter");
            self.paths.no_match_dir(series_title)
        } else {
            error!(series_title = series_title, error = ?error, "Chapter processing failed");
            self.paths.exception_dir(series_title)
        };

        let parked = match move_into(path, &dir) {
            Ok(parked) => parked,
            Err(e) => {
                error!(path = %path.display(), error = ?e, "Failed to move chapter to holding folder");
                path.to_path_buf()
            }
        };

        if not_found {
            Outcome::NoMatch(parked)
        } else {
            Outcome::Exception(parked)
        }
    }

    /// Where a chapter is after a failed rename transaction
    ///
    /// The file is back at its source unless the undo itself failed.
    fn current_location(&self, source: &Path, parsed: &ParsedName) -> PathBuf {
        let target = self
            .paths
            .chapter_file(&parsed.series_title, &parsed.target_filename);
        if !source.exists() && target.exists() {
            target
        } else {
            source.to_path_buf()
        }
    }

    /// Rename transaction for one chapter
    ///
    /// Serialized on the (series, chapter) ledger record first, then on the
    /// target path.
    async fn rename_into_library(
        &self,
        source: &Path,
        original_filename: &str,
        parsed: &ParsedName,
    ) -> Result<PathBuf> {
        let target_name = LibraryPaths::with_extension(&parsed.target_filename);
        let target = self
            .paths
            .chapter_file(&parsed.series_title, &parsed.target_filename);

        let chapter_guard = self
            .coordinator
            .acquire_chapter(&parsed.series_title, &parsed.chapter_number)
            .await;
        let guard = self.coordinator.acquire_rename(&target).await;
        if guard.waited() || chapter_guard.waited() {
            debug!(target_path = %target.display(), "Rename lock released, re-reading record");
        }

        let record = self
            .store
            .find_processed_file(&parsed.series_title, &parsed.chapter_number)?;

        match record {
            None => {
                if target.exists() {
                    return Err(TaggerError::TargetExists(target.display().to_string()).into());
                }
                let record = NewProcessedFile {
                    series_title: parsed.series_title.clone(),
                    chapter_number: parsed.chapter_number.clone(),
                    original_filename: original_filename.to_string(),
                    target_filename: target_name,
                };
                move_and_record(source, &target, || {
                    self.store.insert_processed_file(&record).map(|_| ())
                })?;
            }
            Some(record) if record.target_filename == target_name => {
                let discard = |reason: TaggerError| -> Result<PathBuf> {
                    fs::remove_file(source)
                        .with_context(|| format!("Failed to remove {}", source.display()))?;
                    Err(reason.into())
                };

                if has_version_tag(original_filename) {
                    if !is_newer(&record.original_filename, original_filename) {
                        return discard(TaggerError::FileUpdateNotRequired(original_filename.to_string()));
                    }
                    info!(
                        previous = %record.original_filename,
                        "Newer revision replaces processed chapter"
                    );
                    if target.exists() {
                        fs::remove_file(&target)
                            .with_context(|| format!("Failed to remove {}", target.display()))?;
                    }
                    move_and_record(source, &target, || {
                        self.store
                            .update_processed_file(record.id, original_filename, &target_name)
                    })?;
                } else if has_version_tag(&record.original_filename) {
                    return discard(TaggerError::FileUpdateNotRequired(original_filename.to_string()));
                } else {
                    return discard(TaggerError::FileAlreadyProcessed(original_filename.to_string()));
                }
            }
            Some(record) => {
                info!(
                    previous_target = %record.target_filename,
                    "Chapter was processed under another name"
                );
                if target.exists() {
                    return Err(TaggerError::TargetExists(target.display().to_string()).into());
                }
                move_and_record(source, &target, || {
                    self.store
                        .update_processed_file(record.id, original_filename, &target_name)
                })?;
            }
        }

        drop(guard);
        drop(chapter_guard);
        Ok(target)
    }

    /// Metadata for a series, resolved at most once per process
    async fn metadata(&self, series_title: &str, file_path: &Path) -> Result<Arc<ResolvedMetadata>> {
        let guard = match self.coordinator.acquire_series(series_title).await {
            SeriesTicket::Resolved(metadata) => return Ok(metadata),
            SeriesTicket::Responsible(guard) => guard,
        };

        if let Some(stored) = self.store.find_metadata(series_title)? {
            debug!(series_title = series_title, "Using stored metadata");
            let stored = Arc::new(stored);
            guard.mark_resolved(Arc::clone(&stored));
            return Ok(stored);
        }

        let resolved = self.resolver.resolve(series_title, file_path).await?;
        if self.processing.database_insert {
            self.store.insert_metadata(&resolved)?;
        }

        info!(
            series_title = series_title,
            source = %resolved.source,
            "Series resolved"
        );
        let resolved = Arc::new(resolved);
        guard.mark_resolved(Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Resolve metadata and write it into the chapter
    async fn tag(&self, chapter: &Path, original_path: &Path, parsed: &ParsedName) -> Result<PathBuf> {
        let metadata = self.metadata(&parsed.series_title, original_path).await?;

        if !self.processing.write_comicinfo {
            return Ok(chapter.to_path_buf());
        }

        let xml = ComicInfo::new(&metadata, &parsed.chapter_title, &parsed.chapter_number).to_xml();
        if let Err(e) = embed_comicinfo(chapter, &xml) {
            warn!(path = %chapter.display(), error = ?e, "Failed to write ComicInfo.xml, leaving file in place");
            return Ok(chapter.to_path_buf());
        }

        Ok(relocate_adult(&self.paths, &metadata, chapter)?.unwrap_or_else(|| chapter.to_path_buf()))
    }
}

/// Move a chapter into place and record it, undoing the move if recording fails
fn move_and_record(source: &Path, target: &Path, record: impl FnOnce() -> Result<()>) -> Result<()> {
    move_file(source, target)?;
    if let Err(e) = record() {
        if let Err(undo) = move_file(target, source) {
            error!(
                path = %target.display(),
                error = ?undo,
                "Failed to move chapter back after ledger error"
            );
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Catalog;
    use crate::testing::FakeCatalog;
    use shared::CatalogSource;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    struct Fixture {
        _dir: TempDir,
        intake: PathBuf,
        paths: LibraryPaths,
        store: Arc<Store>,
        next_id: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let intake = dir.path().join("intake");
            let paths = LibraryPaths::new(dir.path().join("library"))
                .with_adult_library(Some(dir.path().join("adult")));
            fs::create_dir_all(&intake).unwrap();
            Self {
                _dir: dir,
                intake,
                paths,
                store: Arc::new(Store::open_in_memory().unwrap()),
                next_id: 0,
            }
        }

        /// Drop a chapter archive into the intake directory
        fn arrive(&mut self, series: Option<&str>, filename: &str) -> FileEvent {
            let dir = match series {
                Some(series) => self.intake.join(series),
                None => self.intake.clone(),
            };
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(filename);
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            zip.start_file("001.jpg", SimpleFileOptions::default()).unwrap();
            zip.write_all(filename.as_bytes()).unwrap();
            zip.finish().unwrap();

            self.next_id += 1;
            FileEvent::new(self.next_id, &self.intake, path)
        }

        fn pipeline(&self, catalogs: Vec<FakeCatalog>, processing: ProcessingConfig) -> Pipeline {
            let catalogs = catalogs
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn Catalog>)
                .collect();
            Pipeline::new(
                self.paths.clone(),
                processing,
                Arc::clone(&self.store),
                DedupCoordinator::new(),
                Resolver::new(catalogs, processing_limit()),
            )
        }
    }

    fn processing_limit() -> usize {
        ProcessingConfig::default().path_length_limit
    }

    fn anilist(title: &str) -> FakeCatalog {
        FakeCatalog::new(CatalogSource::AniList).with_results(title, vec![title])
    }

    fn has_comicinfo(path: &Path) -> bool {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let found = archive.file_names().any(|n| n == "ComicInfo.xml");
        found
    }

    #[tokio::test]
    async fn test_new_chapter_is_tagged() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default());
        let event = fixture.arrive(Some("Berserk"), "Chapter 001.cbz");

        let outcome = pipeline.process(&event).await;

        let expected = fixture.paths.chapter_file("Berserk", "Chapter 1");
        assert!(matches!(&outcome, Outcome::Tagged(path) if *path == expected));
        assert!(!event.path.exists());
        assert!(has_comicinfo(&expected));

        let record = fixture.store.find_processed_file("Berserk", "1").unwrap().unwrap();
        assert_eq!(record.original_filename, "Chapter 001.cbz");
        assert_eq!(record.target_filename, "Chapter 1.cbz");
        assert!(fixture.store.find_metadata("Berserk").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_newer_revision_replaces_chapter() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default());

        let first = fixture.arrive(Some("Berserk"), "Chapter 1 v2.cbz");
        assert!(matches!(pipeline.process(&first).await, Outcome::Tagged(_)));

        let second = fixture.arrive(Some("Berserk"), "Chapter 1 v3.cbz");
        assert!(matches!(pipeline.process(&second).await, Outcome::Tagged(_)));

        let record = fixture.store.find_processed_file("Berserk", "1").unwrap().unwrap();
        assert_eq!(record.original_filename, "Chapter 1 v3.cbz");
        assert!(fixture.paths.chapter_file("Berserk", "Chapter 1").exists());
        assert!(!second.path.exists());
    }

    #[tokio::test]
    async fn test_older_revision_is_discarded() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default());

        let first = fixture.arrive(Some("Berserk"), "Chapter 1 v3.cbz");
        pipeline.process(&first).await;

        let second = fixture.arrive(Some("Berserk"), "Chapter 1 v2.cbz");
        let outcome = pipeline.process(&second).await;

        assert!(matches!(outcome, Outcome::Rejected(TaggerError::FileUpdateNotRequired(_))));
        assert!(!second.path.exists());
        let record = fixture.store.find_processed_file("Berserk", "1").unwrap().unwrap();
        assert_eq!(record.original_filename, "Chapter 1 v3.cbz");
    }

    #[tokio::test]
    async fn test_unversioned_copy_of_versioned_chapter_is_discarded() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default());

        let first = fixture.arrive(Some("Berserk"), "Chapter 1 v2.cbz");
        pipeline.process(&first).await;

        let second = fixture.arrive(Some("Berserk"), "Chapter 1.cbz");
        let outcome = pipeline.process(&second).await;

        assert!(matches!(outcome, Outcome::Rejected(TaggerError::FileUpdateNotRequired(_))));
        assert!(!second.path.exists());
    }

    #[tokio::test]
    async fn test_identical_chapter_is_discarded() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default());

        let first = fixture.arrive(Some("Berserk"), "Chapter 1.cbz");
        pipeline.process(&first).await;

        let second = fixture.arrive(Some("Berserk"), "Chapter 001.cbz");
        let outcome = pipeline.process(&second).await;

        assert!(matches!(outcome, Outcome::Rejected(TaggerError::FileAlreadyProcessed(_))));
        assert!(!second.path.exists());
        assert!(fixture.paths.chapter_file("Berserk", "Chapter 1").exists());
    }

    #[tokio::test]
    async fn test_concurrent_copies_renamed_once() {
        let mut fixture = Fixture::new();
        let pipeline = Arc::new(fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default()));

        let events: Vec<_> = ["Chapter 1.cbz", "Chapter 01.cbz", "Chapter 001.cbz", "Ch. 1.cbz"]
            .into_iter()
            .map(|name| fixture.arrive(Some("Berserk"), name))
            .collect();

        let handles: Vec<_> = events
            .into_iter()
            .map(|event| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.process(&event).await })
            })
            .collect();

        let mut tagged = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Outcome::Tagged(_) => tagged += 1,
                Outcome::Rejected(TaggerError::FileAlreadyProcessed(_)) => rejected += 1,
                other => panic!("unexpected outcome: {}", other),
            }
        }
        assert_eq!((tagged, rejected), (1, 3));
    }

    #[tokio::test]
    async fn test_series_resolved_once_across_chapters() {
        let mut fixture = Fixture::new();
        let catalog = anilist("Berserk").with_delay(Duration::from_millis(20));
        let pipeline = Arc::new(fixture.pipeline(vec![catalog.clone()], ProcessingConfig::default()));

        let events: Vec<_> = (1..=3)
            .map(|n| fixture.arrive(Some("Berserk"), &format!("Chapter {}.cbz", n)))
            .collect();

        let handles: Vec<_> = events
            .into_iter()
            .map(|event| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.process(&event).await })
            })
            .collect();

        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Outcome::Tagged(_)));
        }
        assert_eq!(catalog.searches(), 1);
        assert_eq!(catalog.fetches(), 1);
    }

    #[tokio::test]
    async fn test_stored_metadata_skips_catalogs() {
        let mut fixture = Fixture::new();
        let catalog = anilist("Berserk");
        let first = fixture.pipeline(vec![catalog.clone()], ProcessingConfig::default());
        first.process(&fixture.arrive(Some("Berserk"), "Chapter 1.cbz")).await;

        // A fresh process only has the ledger to go on
        let second = fixture.pipeline(vec![catalog.clone()], ProcessingConfig::default());
        let outcome = second.process(&fixture.arrive(Some("Berserk"), "Chapter 2.cbz")).await;

        assert!(matches!(outcome, Outcome::Tagged(_)));
        assert_eq!(catalog.searches(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_series_goes_to_no_match() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Vagabond")], ProcessingConfig::default());
        let event = fixture.arrive(None, "Berserk -.- Chapter 5.cbz");

        let outcome = pipeline.process(&event).await;

        let expected = fixture.paths.no_match_dir("Berserk").join("Chapter 5.cbz");
        assert!(matches!(&outcome, Outcome::NoMatch(path) if *path == expected));
        assert!(expected.exists());
        // The rename was already recorded
        assert!(fixture.store.find_processed_file("Berserk", "5").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_catalog_failure_goes_to_exception() {
        let mut fixture = Fixture::new();
        let catalog = anilist("Berserk").failing_fetch();
        let pipeline = fixture.pipeline(vec![catalog], ProcessingConfig::default());
        let event = fixture.arrive(Some("Berserk"), "Chapter 5.cbz");

        let outcome = pipeline.process(&event).await;

        let expected = fixture.paths.exception_dir("Berserk").join("Chapter 5.cbz");
        assert!(matches!(&outcome, Outcome::Exception(path) if *path == expected));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_adult_source_relocated() {
        let mut fixture = Fixture::new();
        let catalog = FakeCatalog::new(CatalogSource::NHentai).with_results("Summer Days", vec!["Summer Days"]);
        let pipeline = fixture.pipeline(vec![catalog], ProcessingConfig::default());
        let event = fixture.arrive(Some("Summer Days"), "Chapter 1.cbz");

        let outcome = pipeline.process(&event).await;

        let expected = fixture
            .paths
            .adult_chapter_file("Summer Days", "Chapter 1.cbz")
            .unwrap();
        assert!(matches!(&outcome, Outcome::Tagged(path) if *path == expected));
        assert!(has_comicinfo(&expected));
    }

    #[tokio::test]
    async fn test_mode_switches() {
        let mut fixture = Fixture::new();
        let processing = ProcessingConfig {
            rename_file: false,
            database_insert: false,
            write_comicinfo: false,
            ..ProcessingConfig::default()
        };
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], processing);
        let event = fixture.arrive(Some("Berserk"), "Chapter 1.cbz");

        let outcome = pipeline.process(&event).await;

        assert!(matches!(&outcome, Outcome::Tagged(path) if *path == event.path));
        assert!(!has_comicinfo(&event.path));
        assert!(fixture.store.find_processed_file("Berserk", "1").unwrap().is_none());
        assert!(fixture.store.find_metadata("Berserk").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_archive_left_in_place() {
        let mut fixture = Fixture::new();
        let pipeline = fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default());
        let event = fixture.arrive(Some("Berserk"), "Chapter 9.cbz");
        fs::write(&event.path, "not a zip").unwrap();

        let outcome = pipeline.process(&event).await;

        let expected = fixture.paths.chapter_file("Berserk", "Chapter 9");
        assert!(matches!(&outcome, Outcome::Tagged(path) if *path == expected));
        assert_eq!(fs::read_to_string(&expected).unwrap(), "not a zip");
    }

    #[test]
    fn test_failed_record_moves_chapter_back() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("intake").join("Chapter 1.cbz");
        let target = dir.path().join("library").join("Berserk").join("Chapter 1.cbz");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "pages").unwrap();

        let result = move_and_record(&source, &target, || Err(anyhow::anyhow!("ledger unavailable")));

        assert!(result.is_err());
        assert!(source.exists());
        assert!(!target.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_chapter_under_two_names_stays_recorded() {
        for _ in 0..50 {
            let mut fixture = Fixture::new();
            let pipeline = Arc::new(fixture.pipeline(vec![anilist("Berserk")], ProcessingConfig::default()));
            let events = vec![
                fixture.arrive(Some("Berserk"), "Vol. 1 Chapter 1 Foo.cbz"),
                fixture.arrive(Some("Berserk"), "Chapter 1.cbz"),
            ];

            let handles: Vec<_> = events
                .into_iter()
                .map(|event| {
                    let pipeline = Arc::clone(&pipeline);
                    tokio::spawn(async move { pipeline.process(&event).await })
                })
                .collect();

            let mut tagged = Vec::new();
            for handle in handles {
                match handle.await.unwrap() {
                    Outcome::Tagged(path) => tagged.push(path),
                    other => panic!("unexpected outcome: {}", other),
                }
            }

            assert!(tagged.iter().all(|path| path.exists()));
            let record = fixture.store.find_processed_file("Berserk", "1").unwrap().unwrap();
            let recorded = fixture.paths.series_dir("Berserk").join(&record.target_filename);
            assert!(tagged.contains(&recorded));
        }
    }
}
