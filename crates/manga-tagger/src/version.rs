//! Revision tags embedded in chapter filenames.

/// Revision tags, tried in order; the first one present wins
const VERSION_TAGS: [(&str, u8); 4] = [("v2", 2), ("v3", 3), ("v4", 4), ("v5", 5)];

/// Revision number carried by a filename, 0 when it carries none
pub fn version_of(filename: &str) -> u8 {
    let lower = filename.to_lowercase();
    VERSION_TAGS
        .iter()
        .find(|(tag, _)| lower.contains(tag))
        .map(|(_, version)| *version)
        .unwrap_or(0)
}

/// Whether a filename carries any revision tag
pub fn has_version_tag(filename: &str) -> bool {
    version_of(filename) > 0
}

/// Whether `new_filename` is a strictly later revision than `old_filename`
pub fn is_newer(old_filename: &str, new_filename: &str) -> bool {
    version_of(new_filename) > version_of(old_filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer() {
        assert!(is_newer("Foo v2.cbz", "Foo v3.cbz"));
        assert!(is_newer("Foo.cbz", "Foo v2.cbz"));
        assert!(!is_newer("Foo v3.cbz", "Foo v2.cbz"));
        assert!(!is_newer("Foo v2.cbz", "Foo V2.cbz"));
        assert!(!is_newer("Foo.cbz", "Foo.cbz"));
    }

    #[test]
    fn test_version_of() {
        assert_eq!(version_of("Chapter 10 V4.cbz"), 4);
        assert_eq!(version_of("Chapter 10.cbz"), 0);
        // v1 is not a recognised tag
        assert_eq!(version_of("Chapter 10 v1.cbz"), 0);
        assert!(has_version_tag("Chapter 1 v5"));
        assert!(!has_version_tag("Chapter 1"));
    }
}
