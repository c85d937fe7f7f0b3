//! Embedded article document queries
//!
//! Single-pass event walk over the package's XML document collecting every
//! field the checkin procedure and the validation stages ask for. Mixed
//! content (inline markup inside titles, multi-paragraph acknowledgments)
//! is flattened to text.

use crate::error::{IntakeError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One entry of the document's reference list
#[derive(Debug, Clone, Default)]
pub struct RefEntry {
    pub id: String,
    pub publication_type: Option<String>,
    pub source: Option<String>,
    pub year: Option<String>,
    pub article_title: Option<String>,
}

/// Parsed view of the article document
///
/// Every field is optional; absence is data, not an error. Validation
/// stages decide what absence means for them.
#[derive(Debug, Clone, Default)]
pub struct ArticleDocument {
    pub journal_title: Option<String>,
    pub abbrev_journal_title: Option<String>,
    pub nlm_title: Option<String>,
    pub publisher_name: Option<String>,
    pub issn_print: Option<String>,
    pub issn_electronic: Option<String>,
    pub article_title: Option<String>,
    pub doi: Option<String>,
    pub section_title: Option<String>,
    pub pub_year: Option<String>,
    pub pub_month: Option<String>,
    pub pub_season: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub has_funding_group: bool,
    pub funding_awards: Vec<String>,
    pub ack_text: Option<String>,
    pub has_license: bool,
    pub license_uri: Option<String>,
    pub references: Vec<RefEntry>,
}

/// Where the text of the currently-open capture element goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    JournalTitle,
    AbbrevJournalTitle,
    NlmTitle,
    PublisherName,
    IssnPrint,
    IssnElectronic,
    ArticleTitle,
    Doi,
    SectionSubjectHeading,
    SectionSubjectFallback,
    PubMonth,
    PubYear,
    PubSeason,
    Volume,
    IssueNumber,
    AwardId,
    RefSource,
    RefYear,
    RefArticleTitle,
}

struct Capture {
    target: Target,
    /// Stack depth of the capture element; the capture closes when an End
    /// event pops the stack below this depth
    depth: usize,
    buf: String,
}

struct Walker {
    doc: ArticleDocument,
    stack: Vec<String>,
    capture: Option<Capture>,
    /// Depth of a subj-group[@subj-group-type="heading"] we are inside
    heading_depth: Option<usize>,
    /// Depth of an <ack> we are inside, plus its accumulated text
    ack_depth: Option<usize>,
    ack_buf: String,
    current_ref: Option<RefEntry>,
}

impl ArticleDocument {
    /// Parse the document from raw bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut walker = Walker {
            doc: ArticleDocument::default(),
            stack: Vec::new(),
            capture: None,
            heading_depth: None,
            ack_depth: None,
            ack_buf: String::new(),
            current_ref: None,
        };

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => walker.on_start(&e)?,
                Ok(Event::Empty(e)) => {
                    walker.on_start(&e)?;
                    walker.on_end();
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| IntakeError::InvalidInput(format!("bad XML text: {e}")))?;
                    walker.on_text(&text);
                }
                Ok(Event::End(_)) => walker.on_end(),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(IntakeError::InvalidInput(format!(
                        "malformed article document: {e}"
                    )))
                }
            }
            buf.clear();
        }

        Ok(walker.doc)
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.to_string())
}

impl Walker {
    fn in_stack(&self, name: &str) -> bool {
        self.stack.iter().any(|s| s == name)
    }

    fn on_start(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
        self.stack.push(name.clone());
        let depth = self.stack.len();

        match name.as_str() {
            "journal-title" if self.in_stack("journal-meta") => {
                self.open_capture(Target::JournalTitle, depth);
            }
            "abbrev-journal-title" if self.in_stack("journal-meta") => {
                self.open_capture(Target::AbbrevJournalTitle, depth);
            }
            "journal-id" if attr(e, "journal-id-type").as_deref() == Some("nlm-ta") => {
                self.open_capture(Target::NlmTitle, depth);
            }
            "publisher-name" if self.in_stack("journal-meta") => {
                self.open_capture(Target::PublisherName, depth);
            }
            "issn" if self.in_stack("journal-meta") => {
                let target = match attr(e, "pub-type").as_deref() {
                    Some("epub") => Target::IssnElectronic,
                    Some(_) => Target::IssnPrint,
                    None if self.doc.issn_print.is_none() => Target::IssnPrint,
                    None => Target::IssnElectronic,
                };
                self.open_capture(target, depth);
            }
            "article-title" if self.in_stack("ref") => {
                self.open_capture(Target::RefArticleTitle, depth);
            }
            "article-title" if self.in_stack("title-group") && self.in_stack("article-meta") => {
                self.open_capture(Target::ArticleTitle, depth);
            }
            "article-id" if attr(e, "pub-id-type").as_deref() == Some("doi") => {
                self.open_capture(Target::Doi, depth);
            }
            "subj-group" if attr(e, "subj-group-type").as_deref() == Some("heading") => {
                self.heading_depth = Some(depth);
            }
            "subject" if self.in_stack("article-categories") => {
                // A heading subj-group wins over whatever subject came first
                let target = if self.heading_depth.is_some() {
                    Target::SectionSubjectHeading
                } else {
                    Target::SectionSubjectFallback
                };
                self.open_capture(target, depth);
            }
            "month" if self.in_stack("pub-date") => self.open_capture(Target::PubMonth, depth),
            "year" if self.in_stack("pub-date") => self.open_capture(Target::PubYear, depth),
            "year" if self.in_stack("ref") => self.open_capture(Target::RefYear, depth),
            "season" if self.in_stack("pub-date") => self.open_capture(Target::PubSeason, depth),
            "volume" if self.in_stack("article-meta") && !self.in_stack("ref") => {
                self.open_capture(Target::Volume, depth);
            }
            "issue" if self.in_stack("article-meta") && !self.in_stack("ref") => {
                self.open_capture(Target::IssueNumber, depth);
            }
            "funding-group" => self.doc.has_funding_group = true,
            "award-id" => self.open_capture(Target::AwardId, depth),
            "ack" => self.ack_depth = Some(depth),
            "license" => {
                self.doc.has_license = true;
                if let Some(uri) = attr(e, "href").or_else(|| attr(e, "xlink:href")) {
                    self.doc.license_uri = Some(uri);
                }
            }
            "ref" => {
                self.current_ref = Some(RefEntry {
                    id: attr(e, "id").unwrap_or_default(),
                    ..RefEntry::default()
                });
            }
            "element-citation" | "citation" | "mixed-citation" | "nlm-citation" => {
                if let Some(r) = self.current_ref.as_mut() {
                    r.publication_type = attr(e, "publication-type");
                }
            }
            "source" if self.in_stack("ref") => self.open_capture(Target::RefSource, depth),
            _ => {}
        }

        Ok(())
    }

    fn open_capture(&mut self, target: Target, depth: usize) {
        if self.capture.is_none() {
            self.capture = Some(Capture {
                target,
                depth,
                buf: String::new(),
            });
        }
    }

    fn on_text(&mut self, text: &str) {
        if let Some(c) = self.capture.as_mut() {
            if !c.buf.is_empty() {
                c.buf.push(' ');
            }
            c.buf.push_str(text);
        } else if self.ack_depth.is_some() {
            if !self.ack_buf.is_empty() {
                self.ack_buf.push(' ');
            }
            self.ack_buf.push_str(text);
        }
    }

    fn on_end(&mut self) {
        let closing = self.stack.pop();
        let depth_after = self.stack.len();

        if let Some(c) = &self.capture {
            if depth_after < c.depth {
                let c = self.capture.take().expect("capture present");
                self.assign(c.target, c.buf.trim().to_string());
            }
        }

        if let Some(d) = self.heading_depth {
            if depth_after < d {
                self.heading_depth = None;
            }
        }

        if let Some(d) = self.ack_depth {
            if depth_after < d {
                self.ack_depth = None;
                let text = self.ack_buf.trim().to_string();
                if !text.is_empty() {
                    self.doc.ack_text = Some(text);
                }
            }
        }

        if closing.as_deref() == Some("ref") {
            if let Some(r) = self.current_ref.take() {
                self.doc.references.push(r);
            }
        }
    }

    fn assign(&mut self, target: Target, value: String) {
        if value.is_empty()
            && !matches!(
                target,
                Target::RefSource | Target::RefYear | Target::RefArticleTitle
            )
        {
            return;
        }

        let doc = &mut self.doc;
        match target {
            Target::JournalTitle => set_if_empty(&mut doc.journal_title, value),
            Target::AbbrevJournalTitle => set_if_empty(&mut doc.abbrev_journal_title, value),
            Target::NlmTitle => set_if_empty(&mut doc.nlm_title, value),
            Target::PublisherName => set_if_empty(&mut doc.publisher_name, value),
            Target::IssnPrint => set_if_empty(&mut doc.issn_print, value),
            Target::IssnElectronic => set_if_empty(&mut doc.issn_electronic, value),
            Target::ArticleTitle => set_if_empty(&mut doc.article_title, value),
            Target::Doi => set_if_empty(&mut doc.doi, value),
            Target::SectionSubjectHeading => doc.section_title = Some(value),
            Target::SectionSubjectFallback => set_if_empty(&mut doc.section_title, value),
            Target::PubMonth => set_if_empty(&mut doc.pub_month, value),
            Target::PubYear => set_if_empty(&mut doc.pub_year, value),
            Target::PubSeason => set_if_empty(&mut doc.pub_season, value),
            Target::Volume => set_if_empty(&mut doc.volume, value),
            Target::IssueNumber => set_if_empty(&mut doc.number, value),
            Target::AwardId => doc.funding_awards.push(value),
            Target::RefSource => {
                if let Some(r) = self.current_ref.as_mut() {
                    r.source = Some(value);
                }
            }
            Target::RefYear => {
                if let Some(r) = self.current_ref.as_mut() {
                    r.year = Some(value);
                }
            }
            Target::RefArticleTitle => {
                if let Some(r) = self.current_ref.as_mut() {
                    r.article_title = Some(value);
                }
            }
        }
    }
}

fn set_if_empty(slot: &mut Option<String>, value: String) {
    if slot.is_none() {
        *slot = Some(value);
    }
}
