//! Semantic error kinds raised while processing a chapter.

use thiserror::Error;

/// Outcomes that stop a chapter short of the library
///
/// None of these are fatal to the process; the pipeline classifies them
/// by downcasting the `anyhow::Error` a stage returned.
#[derive(Debug, Error)]
pub enum TaggerError {
    /// No structure could be derived from the filename
    #[error("Unable to parse filename: {0}")]
    UnparsableFilename(String),

    /// The same chapter is already in the library under the same name
    #[error("File already processed: {0}")]
    FileAlreadyProcessed(String),

    /// The incoming file is an equal or older revision of a processed chapter
    #[error("File update not required: {0}")]
    FileUpdateNotRequired(String),

    /// No catalog produced an acceptable match, fallback titles included
    #[error("Manga not found: {0}")]
    MangaNotFound(String),

    /// A file already occupies the target path but no rename was recorded for it
    #[error("Target already exists without a processed record: {0}")]
    TargetExists(String),
}

impl TaggerError {
    /// Whether the incoming file was rejected as a duplicate
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            TaggerError::FileAlreadyProcessed(_) | TaggerError::FileUpdateNotRequired(_)
        )
    }
}
