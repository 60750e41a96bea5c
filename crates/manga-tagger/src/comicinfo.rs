//! ComicInfo.xml document construction.

use chrono::Datelike;
use shared::ResolvedMetadata;
use std::fmt::Write;

/// Metadata document embedded in every tagged chapter
#[derive(Debug, Clone, PartialEq)]
pub struct ComicInfo {
    pub title: String,
    pub series: String,
    pub alternate_series: Option<String>,
    pub number: String,
    pub summary: Option<String>,
    pub page_count: Option<u32>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub cover_artist: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub web: Option<String>,
    pub notes: String,
}

fn first(values: &[String]) -> Option<String> {
    values.first().cloned()
}

/// Title to show next to the series title
///
/// The English title when the series is known under another name, else the
/// Japanese title, else the first synonym.
fn alternate_series(metadata: &ResolvedMetadata) -> Option<String> {
    let differs = |title: &&String| **title != metadata.series_title;
    metadata
        .series_title_eng
        .as_ref()
        .filter(differs)
        .or_else(|| metadata.series_title_jap.as_ref().filter(differs))
        .cloned()
        .or_else(|| first(&metadata.alternate_titles))
}

impl ComicInfo {
    pub fn new(metadata: &ResolvedMetadata, chapter_title: &str, chapter_number: &str) -> Self {
        let staff = &metadata.staff;
        let genre = (!metadata.genres.is_empty()).then(|| metadata.genres.join(","));

        Self {
            title: chapter_title.to_string(),
            series: metadata.series_title.clone(),
            alternate_series: alternate_series(metadata),
            number: chapter_number.to_string(),
            summary: metadata.description.clone(),
            page_count: metadata.page_count,
            year: metadata.publish_date.map(|d| d.year()),
            month: metadata.publish_date.map(|d| d.month()),
            day: metadata.publish_date.map(|d| d.day()),
            writer: first(&staff.story),
            penciller: first(&staff.art),
            cover_artist: first(&staff.cover).or_else(|| first(&staff.art)),
            publisher: first(&metadata.serializations),
            genre,
            web: metadata.url.clone(),
            notes: format!(
                "Scraped metadata from {} on {}",
                metadata.source,
                metadata.scraped_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }

    /// Render the document
    ///
    /// Art credits also fill Inker, Colorist and Letterer. Unknown values
    /// render as empty elements.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        xml.push_str(
            "<ComicInfo xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n",
        );

        let page_count = self.page_count.map(|n| n.to_string());
        let year = self.year.map(|n| n.to_string());
        let month = self.month.map(|n| n.to_string());
        let day = self.day.map(|n| n.to_string());

        let elements: [(&str, Option<&str>); 21] = [
            ("Title", Some(self.title.as_str())),
            ("Series", Some(self.series.as_str())),
            ("AlternateSeries", self.alternate_series.as_deref()),
            ("Number", Some(self.number.as_str())),
            ("Summary", self.summary.as_deref()),
            ("PageCount", page_count.as_deref()),
            ("Year", year.as_deref()),
            ("Month", month.as_deref()),
            ("Day", day.as_deref()),
            ("Writer", self.writer.as_deref()),
            ("Penciller", self.penciller.as_deref()),
            ("Inker", self.penciller.as_deref()),
            ("Colorist", self.penciller.as_deref()),
            ("Letterer", self.penciller.as_deref()),
            ("CoverArtist", self.cover_artist.as_deref()),
            ("Publisher", self.publisher.as_deref()),
            ("Genre", self.genre.as_deref()),
            ("Web", self.web.as_deref()),
            ("LanguageISO", Some("en")),
            ("Manga", Some("Yes")),
            ("Notes", Some(self.notes.as_str())),
        ];

        for (name, value) in elements {
            let _ = writeln!(xml, "   <{name}>{}</{name}>", escape(value.unwrap_or_default()));
        }

        xml.push_str("</ComicInfo>\n");
        xml
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
