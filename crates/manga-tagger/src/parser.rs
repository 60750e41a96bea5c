//! Filename inference for incoming chapter archives.
//!
//! Turns an unstructured archive filename (plus the series title, when the
//! file arrived inside a per-series directory) into the canonical chapter
//! name the library uses.

use crate::error::TaggerError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Separates the series from the chapter text in flat-intake filenames
const SERIES_SEPARATOR: &str = "-.-";

/// Archive extensions stripped before parsing
const ARCHIVE_EXTENSIONS: [&str; 2] = [".cbz", ".zip"];

/// Chapter markers, tried in order
static CHAPTER_DELIMITERS: Lazy<Vec<Regex>> =
    Lazy::new(|| ["chapter", "ch.", "ch", "act"].iter().map(|d| delimiter(d)).collect());

/// Volume markers, tried in order
static VOLUME_DELIMITERS: Lazy<Vec<Regex>> =
    Lazy::new(|| ["volume", "vol.", "vol"].iter().map(|d| delimiter(d)).collect());

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number pattern"));

/// A delimiter must start the string or follow whitespace, and be followed
/// by a digit, a dot or a space.
fn delimiter(word: &str) -> Regex {
    Regex::new(&format!(r"(?i)(?:^|\s)({})[0-9. ]", regex::escape(word)))
        .expect("valid delimiter pattern")
}

/// Structured guess derived from a filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Canonical filename, without extension
    pub target_filename: String,
    /// Decimal chapter number; "0" for oneshots and unparsable names
    pub chapter_number: String,
    pub chapter_title: String,
    pub series_title: String,
}

/// Parse a chapter filename
///
/// `known_series` is the series directory the file arrived in; it is `None`
/// for files dropped straight into the intake directory. Names that match
/// no convention degrade to target `000`, chapter `0`.
pub fn parse(filename: &str, known_series: Option<&str>) -> Result<ParsedName, TaggerError> {
    let mut name = title_case(strip_extension(filename));
    let mut series = known_series
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if let Some((left, right)) = name.split_once(SERIES_SEPARATOR) {
        let left = left.trim().to_string();
        let right = right.trim().to_string();
        debug!(filename = filename, chapter_text = %right, "Split flat-intake filename");
        if series.is_none() && !left.is_empty() {
            debug!(series_title = %left, "Series title taken from filename");
            series = Some(left);
        }
        name = right;
    }

    if name.trim().is_empty() {
        return Err(TaggerError::UnparsableFilename(filename.to_string()));
    }

    for chapter_delimiter in CHAPTER_DELIMITERS.iter() {
        let Some(found) = chapter_delimiter.captures(&name).and_then(|c| c.get(1)) else {
            continue;
        };

        let prefix = &name[..found.start()];
        let chapter_text = name[found.end()..].trim();

        let Some(number) = NUMBER.find(chapter_text) else {
            debug!(
                delimiter = found.as_str(),
                "Chapter number not found, trying next delimiter"
            );
            continue;
        };

        let volume = find_volume(prefix);
        let chapter_number = strip_leading_zeros(number.as_str());
        let chapter_title = chapter_text[number.end()..].trim().to_string();

        let series_title = series
            .clone()
            .or_else(|| series_from_prefix(prefix, volume.as_ref().map(|(start, _)| *start)))
            .unwrap_or_else(|| name.trim().to_string());

        let target_filename = match (&volume, chapter_title.is_empty()) {
            (Some((_, volume_number)), false) => {
                format!("Vol. {} Chapter {}", volume_number, chapter_number)
            }
            _ => format!("Chapter {}", chapter_number),
        };

        debug!(
            filename = filename,
            target_filename = %target_filename,
            chapter_number = %chapter_number,
            "Parsed chapter filename"
        );

        return Ok(ParsedName {
            target_filename,
            chapter_number,
            chapter_title: if chapter_title.is_empty() {
                series_title.clone()
            } else {
                chapter_title
            },
            series_title,
        });
    }

    let series_title = series.unwrap_or_else(|| name.trim().to_string());

    if name.to_lowercase().contains("oneshot") {
        debug!(filename = filename, "Parsed as oneshot");
        return Ok(ParsedName {
            target_filename: series_title.clone(),
            chapter_number: "0".to_string(),
            chapter_title: series_title.clone(),
            series_title,
        });
    }

    let trimmed = name.trim();
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        debug!(filename = filename, "Filename is a bare number");
        return Ok(ParsedName {
            target_filename: trimmed.to_string(),
            chapter_number: strip_leading_zeros(trimmed),
            chapter_title: series_title.clone(),
            series_title,
        });
    }

    debug!(filename = filename, "No chapter convention matched, using fallback name");
    Ok(ParsedName {
        target_filename: "000".to_string(),
        chapter_number: "0".to_string(),
        chapter_title: series_title.clone(),
        series_title,
    })
}

/// Find a volume marker and its number; returns (marker start, number)
fn find_volume(prefix: &str) -> Option<(usize, String)> {
    for volume_delimiter in VOLUME_DELIMITERS.iter() {
        if let Some(found) = volume_delimiter.captures(prefix).and_then(|c| c.get(1)) {
            if let Some(number) = NUMBER.find(&prefix[found.end()..]) {
                return Some((found.start(), number.as_str().to_string()));
            }
        }
    }
    None
}

/// Series title implied by the text before the chapter marker
fn series_from_prefix(prefix: &str, volume_start: Option<usize>) -> Option<String> {
    let head = match volume_start {
        Some(start) => &prefix[..start],
        None => prefix,
    };
    let head = head.trim().trim_end_matches(['-', '_', ':', ',']).trim();
    (!head.is_empty()).then(|| head.to_string())
}

fn strip_extension(filename: &str) -> &str {
    let lower = filename.to_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext) && filename.is_char_boundary(filename.len() - ext.len()))
        .map(|ext| &filename[..filename.len() - ext.len()])
        .unwrap_or(filename)
}

/// Strip leading zeros from the integer part, keeping at least one digit
fn strip_leading_zeros(number: &str) -> String {
    let (integer, fraction) = match number.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (number, None),
    };
    let integer = integer.trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    match fraction {
        Some(fraction) => format!("{}.{}", integer, fraction),
        None => integer.to_string(),
    }
}

/// Capitalize the first letter of every word and lowercase the rest
///
/// A word starts at any letter that does not follow another letter, so
/// `it's` becomes `It'S` and `3rd` becomes `3Rd`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(c);
            previous_cased = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(filename: &str, known: Option<&str>) -> ParsedName {
        parse(filename, known).unwrap()
    }

    #[test]
    fn test_plain_chapter_with_known_series() {
        let name = parsed("Chapter 005.cbz", Some("X"));
        assert_eq!(name.target_filename, "Chapter 5");
        assert_eq!(name.chapter_number, "5");
        assert_eq!(name.chapter_title, "X");
        assert_eq!(name.series_title, "X");
    }

    #[test]
    fn test_volume_and_titled_chapter() {
        let name = parsed("Vol. 2 Ch. 10 Homecoming.cbz", None);
        assert_eq!(name.target_filename, "Vol. 2 Chapter 10");
        assert_eq!(name.chapter_number, "10");
        assert_eq!(name.chapter_title, "Homecoming");
    }

    #[test]
    fn test_volume_dropped_when_chapter_untitled() {
        let name = parsed("Vol. 3 Chapter 7.cbz", Some("Berserk"));
        assert_eq!(name.target_filename, "Chapter 7");
        assert_eq!(name.chapter_title, "Berserk");
    }

    #[test]
    fn test_series_dash_chapter_rest() {
        let name = parsed("berserk - chapter 012.5 the black swordsman.cbz", None);
        assert_eq!(name.chapter_number, "12.5");
        assert_eq!(name.chapter_title, "The Black Swordsman");
        assert_eq!(name.series_title, "Berserk");
        assert_eq!(name.target_filename, "Chapter 12.5");
    }

    #[test]
    fn test_flat_intake_separator() {
        let name = parsed("One Piece -.- Chapter 1044.cbz", None);
        assert_eq!(name.series_title, "One Piece");
        assert_eq!(name.chapter_number, "1044");
        assert_eq!(name.target_filename, "Chapter 1044");

        // A known series wins over the embedded one
        let name = parsed("One Piece -.- Chapter 1044.cbz", Some("Wan Pīsu"));
        assert_eq!(name.series_title, "Wan Pīsu");
    }

    #[test]
    fn test_false_positive_delimiter_is_skipped() {
        let name = parsed("Act 2 - The Last Chapter .cbz", Some("Hamlet"));
        assert_eq!(name.chapter_number, "2");
        assert_eq!(name.chapter_title, "- The Last Chapter");
        assert_eq!(name.target_filename, "Chapter 2");
    }

    #[test]
    fn test_delimiter_inside_word_is_ignored() {
        let name = parsed("Mochi Ch 5.cbz", None);
        assert_eq!(name.series_title, "Mochi");
        assert_eq!(name.chapter_number, "5");
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(parsed("Chapter 000.cbz", Some("X")).chapter_number, "0");
        assert_eq!(parsed("Chapter 0.5.cbz", Some("X")).chapter_number, "0.5");
        assert_eq!(parsed("Chapter 0012.50.cbz", Some("X")).chapter_number, "12.50");
    }

    #[test]
    fn test_oneshot() {
        let name = parsed("Oneshot.cbz", Some("Series Z"));
        assert_eq!(name.chapter_number, "0");
        assert_eq!(name.target_filename, "Series Z");
    }

    #[test]
    fn test_bare_number() {
        let name = parsed("0042.cbz", Some("Series Z"));
        assert_eq!(name.target_filename, "0042");
        assert_eq!(name.chapter_number, "42");
    }

    #[test]
    fn test_fallback() {
        let name = parsed("random scan notes.cbz", None);
        assert_eq!(name.target_filename, "000");
        assert_eq!(name.chapter_number, "0");
        assert_eq!(name.series_title, "Random Scan Notes");

        let name = parsed("random scan notes.cbz", Some("Known"));
        assert_eq!(name.series_title, "Known");
    }

    #[test]
    fn test_empty_name_is_unparsable() {
        assert!(matches!(
            parse(".cbz", None),
            Err(TaggerError::UnparsableFilename(_))
        ));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("vol. 2 ch. 10 homecoming"), "Vol. 2 Ch. 10 Homecoming");
        assert_eq!(title_case("it's 3rd"), "It'S 3Rd");
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("Chapter 1.CBZ"), "Chapter 1");
        assert_eq!(strip_extension("Chapter 1.zip"), "Chapter 1");
        assert_eq!(strip_extension("Chapter 1"), "Chapter 1");
    }
}
