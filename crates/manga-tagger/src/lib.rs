//! Manga tagger library for renaming, deduplicating and tagging chapter archives.
//!
//! This library infers chapter structure from filenames, resolves series
//! metadata against a ranked set of online catalogs, and embeds the result
//! as `ComicInfo.xml` in each archive.

pub mod api;
pub mod archive;
pub mod comicinfo;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod similarity;
pub mod store;
pub mod version;

#[cfg(test)]
mod testing;

pub use api::{build_catalogs, Catalog, CatalogError};
pub use comicinfo::ComicInfo;
pub use coordinator::DedupCoordinator;
pub use error::TaggerError;
pub use intake::{collect_events, FileEvent};
pub use parser::ParsedName;
pub use pipeline::{Outcome, Pipeline};
pub use resolver::Resolver;
pub use store::Store;
