//! Archive inspector
//!
//! Opens a package archive, classifies members by extension and answers the
//! structural/bibliographic queries the checkin procedure and validation
//! stages depend on. All operations act on whatever path the package was
//! opened from; the guard is responsible for pointing this at a safe copy.

use crate::archive::document::ArticleDocument;
use crate::error::{IntakeError, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Container-level operations
pub trait ArchiveReader {
    /// Member names carrying the given extension; `NoSuchMember` when the
    /// extension is absent
    fn members_by_extension(&self, ext: &str) -> Result<&[String]>;

    /// Lazy sequence of readable member streams for an extension; absent
    /// extensions yield an empty sequence, never an error
    fn open_member(&mut self, ext: &str) -> MemberIter<'_>;

    /// Repackage a named subset of members into a new in-memory archive
    fn extract_subset(&mut self, names: &[String]) -> Result<Vec<u8>>;
}

/// Bibliographic queries over the embedded document
pub trait BibliographicExtractor {
    /// The single XML member, parsed; zero or more than one XML member is
    /// `AmbiguousOrMissingDocument`
    fn primary_document(&mut self) -> Result<ArticleDocument>;

    /// Fixed field set extracted from the primary document
    fn bibliographic_metadata(&mut self) -> Result<BibRecord>;
}

/// Bibliographic field set; absent fields are represented, not omitted
#[derive(Debug, Clone, Default)]
pub struct BibRecord {
    pub journal_title: Option<String>,
    pub issn_print: Option<String>,
    pub issn_electronic: Option<String>,
    pub article_title: Option<String>,
    pub publication_year: Option<String>,
    pub publication_month: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub suppl_volume: Option<String>,
    pub suppl_number: Option<String>,
}

impl BibRecord {
    /// At least one usable journal identifier
    pub fn has_journal_identifier(&self) -> bool {
        self.issn_print.as_deref().is_some_and(|s| !s.is_empty())
            || self
                .issn_electronic
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }

    pub fn has_article_title(&self) -> bool {
        self.article_title.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// One readable member stream
pub struct MemberStream {
    pub name: String,
    data: Cursor<Vec<u8>>,
}

impl Read for MemberStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl MemberStream {
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_inner()
    }
}

/// Iterator over member streams of one extension
pub struct MemberIter<'a> {
    archive: &'a mut ZipArchive<File>,
    names: Vec<String>,
    pos: usize,
}

impl Iterator for MemberIter<'_> {
    type Item = MemberStream;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.names.len() {
            let name = self.names[self.pos].clone();
            self.pos += 1;
            match read_member(self.archive, &name) {
                Ok(data) => {
                    return Some(MemberStream {
                        name,
                        data: Cursor::new(data),
                    })
                }
                Err(e) => {
                    warn!(member = %name, "Skipping unreadable member: {}", e);
                }
            }
        }
        None
    }
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| IntakeError::CorruptArchive(format!("member {name}: {e}")))?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// One opened package archive
#[derive(Debug)]
pub struct ArticlePackage {
    path: PathBuf,
    archive: ZipArchive<File>,
    by_extension: BTreeMap<String, Vec<String>>,
}

impl ArticlePackage {
    /// Open an archive by path; `CorruptArchive` if it is not a valid
    /// compressed container
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| {
            IntakeError::CorruptArchive(format!("{}: {}", path.display(), e))
        })?;

        // Classify non-empty file entries by lowercased extension;
        // directories and zero-byte entries are ignored
        let mut by_extension: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| {
                IntakeError::CorruptArchive(format!("{}: entry {}: {}", path.display(), i, e))
            })?;
            if entry.is_dir() || entry.size() == 0 {
                continue;
            }
            let name = entry.name().to_string();
            let ext = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            by_extension.entry(ext).or_default().push(name);
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            by_extension,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when at least one member carries the extension
    pub fn has_members(&self, ext: &str) -> bool {
        self.by_extension.contains_key(ext)
    }

    /// All classified extensions, for diagnostics
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.by_extension.keys().map(|s| s.as_str())
    }
}

impl ArchiveReader for ArticlePackage {
    fn members_by_extension(&self, ext: &str) -> Result<&[String]> {
        self.by_extension
            .get(ext)
            .map(|v| v.as_slice())
            .ok_or_else(|| IntakeError::NoSuchMember(ext.to_string()))
    }

    fn open_member(&mut self, ext: &str) -> MemberIter<'_> {
        let names = self.by_extension.get(ext).cloned().unwrap_or_default();
        MemberIter {
            archive: &mut self.archive,
            names,
            pos: 0,
        }
    }

    fn extract_subset(&mut self, names: &[String]) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        for name in names {
            let data = read_member(&mut self.archive, name)?;
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| IntakeError::Processing(format!("repack {name}: {e}")))?;
            writer.write_all(&data)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| IntakeError::Processing(format!("repack finish: {e}")))?;
        Ok(cursor.into_inner())
    }
}

impl BibliographicExtractor for ArticlePackage {
    fn primary_document(&mut self) -> Result<ArticleDocument> {
        let xml_names = self.by_extension.get("xml").cloned().unwrap_or_default();
        if xml_names.len() != 1 {
            return Err(IntakeError::AmbiguousOrMissingDocument(xml_names.len()));
        }
        let bytes = read_member(&mut self.archive, &xml_names[0])?;
        ArticleDocument::parse(&bytes)
    }

    fn bibliographic_metadata(&mut self) -> Result<BibRecord> {
        let doc = self.primary_document()?;

        let (volume, suppl_volume) = split_supplement(doc.volume.as_deref());
        let (number, suppl_number) = split_supplement(doc.number.as_deref());

        Ok(BibRecord {
            journal_title: doc.journal_title,
            issn_print: doc.issn_print,
            issn_electronic: doc.issn_electronic,
            article_title: doc.article_title,
            publication_year: doc.pub_year,
            publication_month: doc.pub_month,
            volume,
            number,
            suppl_volume,
            suppl_number,
        })
    }
}

/// Split a supplement qualifier out of a volume/number string:
/// `"31 Suppl 2"` → `("31", Some("2"))`, `"31 Suppl"` → `("31", Some("0"))`,
/// plain `"31"` → `("31", None)`.
fn split_supplement(raw: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(raw) = raw else {
        return (None, None);
    };
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let marker = tokens.iter().position(|t| {
        let t = t.to_lowercase();
        t == "suppl" || t == "supl" || t == "supplement"
    });

    match marker {
        None => (Some(raw.trim().to_string()).filter(|s| !s.is_empty()), None),
        Some(idx) => {
            let base = tokens[..idx].join(" ");
            let suppl = tokens[idx + 1..].join(" ");
            (
                if base.is_empty() { None } else { Some(base) },
                Some(if suppl.is_empty() {
                    "0".to_string()
                } else {
                    suppl
                }),
            )
        }
    }
}
