//! File path utilities for the manga library.
//!
//! This module provides a centralized way to build every path the tagger
//! moves chapters to: the series directory, the holding folders for files
//! needing manual attention, and the optional adult library.

use std::path::{Path, PathBuf};

/// Holding folder for chapters no catalog matched
pub const NO_MATCH_DIR: &str = "No Match";

/// Holding folder for chapters whose processing failed unexpectedly
pub const EXCEPTION_DIR: &str = "Exception";

/// Extension every tagged chapter carries
pub const CHAPTER_EXTENSION: &str = "cbz";

/// File path manager for the library
#[derive(Debug, Clone)]
pub struct LibraryPaths {
    library: PathBuf,
    adult_library: Option<PathBuf>,
}

impl LibraryPaths {
    /// Create a new LibraryPaths rooted at the given library directory
    pub fn new(library: impl AsRef<Path>) -> Self {
        Self {
            library: library.as_ref().to_path_buf(),
            adult_library: None,
        }
    }

    /// Also route adult-catalog chapters into a separate library
    pub fn with_adult_library(mut self, adult_library: Option<PathBuf>) -> Self {
        self.adult_library = adult_library;
        self
    }

    /// Get the library root
    pub fn library(&self) -> &Path {
        &self.library
    }

    /// Get the adult library root, if configured
    pub fn adult_library(&self) -> Option<&Path> {
        self.adult_library.as_deref()
    }

    /// Directory holding every chapter of a series
    pub fn series_dir(&self, series_title: &str) -> PathBuf {
        self.library.join(Self::sanitize(series_title))
    }

    /// Final location of a chapter inside its series directory
    pub fn chapter_file(&self, series_title: &str, target_filename: &str) -> PathBuf {
        self.series_dir(series_title)
            .join(Self::with_extension(target_filename))
    }

    /// Holding folder for unmatched chapters of a series
    pub fn no_match_dir(&self, series_title: &str) -> PathBuf {
        self.series_dir(series_title).join(NO_MATCH_DIR)
    }

    /// Holding folder for failed chapters of a series
    pub fn exception_dir(&self, series_title: &str) -> PathBuf {
        self.series_dir(series_title).join(EXCEPTION_DIR)
    }

    /// Adult library location for a chapter, if an adult library is configured
    pub fn adult_chapter_file(&self, series_title: &str, file_name: &str) -> Option<PathBuf> {
        self.adult_library
            .as_ref()
            .map(|root| root.join(Self::sanitize(series_title)).join(file_name))
    }

    /// Append the chapter extension to a target filename
    pub fn with_extension(target_filename: &str) -> String {
        format!("{}.{}", target_filename, CHAPTER_EXTENSION)
    }

    /// Make a series title safe to use as a directory name
    pub fn sanitize(title: &str) -> String {
        let cleaned: String = title
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();

        // Trailing dots and spaces are not valid directory names everywhere
        let trimmed = cleaned.trim().trim_end_matches('.').trim_end();
        if trimmed.is_empty() {
            "_".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Create the library roots
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.library)?;
        if let Some(adult) = &self.adult_library {
            std::fs::create_dir_all(adult)?;
        }
        Ok(())
    }
}
