//! Turning intake paths into file events.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Archive extensions picked up from the intake directory
const CHAPTER_EXTENSIONS: [&str; 2] = ["cbz", "zip"];

/// One incoming chapter archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub event_id: u64,
    pub path: PathBuf,
    /// Series directory the file arrived in; `None` for flat intake
    pub known_series: Option<String>,
}

impl FileEvent {
    /// Classify a file by where it sits relative to the intake directory
    pub fn new(event_id: u64, intake_dir: &Path, path: PathBuf) -> Self {
        let parent = path.parent();
        let known_series = match parent {
            Some(dir) if dir != intake_dir => dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            _ => None,
        };
        Self {
            event_id,
            path,
            known_series,
        }
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn is_chapter(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| CHAPTER_EXTENSIONS.contains(&ext.as_str()))
}

/// Every chapter archive under `dir`, sorted by path
fn walk(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Error accessing intake entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_chapter(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Expand files and directories into chapter events
pub fn collect_events(intake_dir: &Path, inputs: &[PathBuf]) -> Result<Vec<FileEvent>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(walk(input));
        } else if is_chapter(input) {
            files.push(input.clone());
        } else {
            warn!(path = %input.display(), "Skipping non-chapter path");
        }
    }

    Ok(files
        .into_iter()
        .enumerate()
        .map(|(i, path)| FileEvent::new(i as u64 + 1, intake_dir, path))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_events() {
        let dir = TempDir::new().unwrap();
        let intake = dir.path();
        fs::create_dir_all(intake.join("Berserk")).unwrap();
        fs::write(intake.join("Berserk/Chapter 1.cbz"), "").unwrap();
        fs::write(intake.join("Monster -.- Chapter 2.cbz"), "").unwrap();
        fs::write(intake.join("notes.txt"), "").unwrap();

        let events = collect_events(intake, &[intake.to_path_buf()]).unwrap();
        assert_eq!(events.len(), 2);

        let nested = events.iter().find(|e| e.filename() == "Chapter 1.cbz").unwrap();
        assert_eq!(nested.known_series.as_deref(), Some("Berserk"));

        let flat = events.iter().find(|e| e.filename() == "Monster -.- Chapter 2.cbz").unwrap();
        assert_eq!(flat.known_series, None);

        let ids: Vec<_> = events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_single_file_input() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Vagabond").join("Chapter 3.CBZ");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "").unwrap();

        let events = collect_events(dir.path(), &[file.clone()]).unwrap();
        assert_eq!(events[0].path, file);
        assert_eq!(events[0].known_series.as_deref(), Some("Vagabond"));
    }

    #[test]
    fn test_walk_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let intake = dir.path();
        fs::create_dir_all(intake.join("Vagabond/extras")).unwrap();
        fs::write(intake.join("Vagabond/Chapter 2.cbz"), "").unwrap();
        fs::write(intake.join("Vagabond/Chapter 10.zip"), "").unwrap();
        fs::write(intake.join("Vagabond/cover.jpg"), "").unwrap();
        fs::write(intake.join("Vagabond/extras/Chapter 1.cbz"), "").unwrap();

        let names: Vec<_> = walk(intake)
            .iter()
            .map(|p| p.strip_prefix(intake).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "Vagabond/Chapter 10.zip",
                "Vagabond/Chapter 2.cbz",
                "Vagabond/extras/Chapter 1.cbz",
            ]
        );
    }
}
