//! Manifest model: the declarative item list a package ships with.
//!
//! - [`load`](ManifestDocument::load) parses JSON or YAML (by extension) and
//!   fails with [`ManifestError::Parse`] on a missing or malformed file.
//! - [`validate`] checks the item schema and fails with
//!   [`ManifestError::Validation`]; it always runs before any acquisition.

mod error;
mod loader;
mod model;

pub use error::{ManifestError, ManifestResult};
pub use loader::{parse_file, validate};
pub use model::{
    Item, ItemType, ManifestDocument, PackageInfo, PackageMetadata, PathBase, SourceKind,
};
