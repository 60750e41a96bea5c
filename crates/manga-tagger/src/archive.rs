//! Chapter archive mutation and file moves.

use anyhow::{Context, Result};
use shared::{LibraryPaths, ResolvedMetadata};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const COMICINFO_NAME: &str = "ComicInfo.xml";

/// Move a file, creating the destination directory
///
/// Falls back to copy and delete when a rename is not possible, e.g.
/// across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if fs::rename(from, to).is_err() {
        fs::copy(from, to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    }

    debug!(from = %from.display(), to = %to.display(), "Moved file");
    Ok(())
}

/// Move a file into a directory, keeping its name
pub fn move_into(from: &Path, dir: &Path) -> Result<PathBuf> {
    let name = from
        .file_name()
        .with_context(|| format!("Not a file path: {}", from.display()))?;
    let to = dir.join(name);
    move_file(from, &to)?;
    Ok(to)
}

/// Rewrite the archive without the named entry
fn remove_entry(path: &Path, entry_name: &str) -> Result<()> {
    let temp = path.with_extension("cbz.tmp");
    {
        let mut source = ZipArchive::new(File::open(path)?)
            .with_context(|| format!("Failed to read archive: {}", path.display()))?;
        let mut out = ZipWriter::new(File::create(&temp)?);
        for i in 0..source.len() {
            let entry = source.by_index_raw(i)?;
            if entry.name() == entry_name {
                continue;
            }
            out.raw_copy_file(entry)?;
        }
        out.finish()?;
    }
    fs::rename(&temp, path).with_context(|| format!("Failed to replace archive: {}", path.display()))?;
    Ok(())
}

/// Write `ComicInfo.xml` into a chapter archive, replacing any existing one
pub fn embed_comicinfo(path: &Path, xml: &str) -> Result<()> {
    let has_comicinfo = {
        let archive = ZipArchive::new(File::open(path)?)
            .with_context(|| format!("Failed to read archive: {}", path.display()))?;
        let found = archive.file_names().any(|name| name == COMICINFO_NAME);
        found
    };

    if has_comicinfo {
        debug!(path = %path.display(), "Replacing existing ComicInfo.xml");
        remove_entry(path, COMICINFO_NAME)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
    let mut zip = ZipWriter::new_append(file)
        .with_context(|| format!("Failed to append to archive: {}", path.display()))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(COMICINFO_NAME, options)?;
    zip.write_all(xml.as_bytes())?;
    zip.finish()?;

    info!(path = %path.display(), "ComicInfo.xml written");
    Ok(())
}

/// Move a chapter sourced from an adult catalog into the adult library
///
/// Returns the new path, or `None` when the chapter stays where it is.
pub fn relocate_adult(
    paths: &LibraryPaths,
    metadata: &ResolvedMetadata,
    chapter: &Path,
) -> Result<Option<PathBuf>> {
    if !metadata.source.is_adult() {
        return Ok(None);
    }

    let series_dir = chapter.parent();
    let series_name = series_dir
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| metadata.series_title.clone());
    let file_name = chapter
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file path: {}", chapter.display()))?;

    let Some(target) = paths.adult_chapter_file(&series_name, &file_name) else {
        return Ok(None);
    };

    move_file(chapter, &target)?;

    // Drop the series directory if this was its only chapter
    if let Some(dir) = series_dir {
        let _ = fs::remove_dir(dir);
    }

    info!(
        source = %metadata.source,
        to = %target.display(),
        "Moved chapter to adult library"
    );
    Ok(Some(target))
}
