//! Package archive handling
//!
//! `inspector` opens the container and answers structural and bibliographic
//! queries; `document` walks the embedded XML; `guard` wraps the inspector
//! with permission locking and safe-copy isolation.

pub mod document;
pub mod guard;
pub mod inspector;

pub use document::{ArticleDocument, RefEntry};
pub use guard::PackageGuard;
pub use inspector::{ArchiveReader, ArticlePackage, BibRecord, BibliographicExtractor};
