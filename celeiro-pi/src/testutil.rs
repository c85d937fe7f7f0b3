//! Shared fixtures for unit and integration tests

use crate::editorial::{
    EditorialError, IssueCriteria, IssueRecord, IssueResolver, JournalRecord,
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Build a zip on disk with the given (name, bytes) members
pub fn build_zip(dir: &Path, file_name: &str, members: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(file_name);
    let file = File::create(&path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, data) in members {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// In-memory database with the intake tables created.
///
/// Capped to one connection: every pooled connection to `:memory:` opens
/// its own database, so a larger pool would scatter the tables.
pub async fn setup_test_db() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    celeiro_common::db::create_tables(&pool).await.unwrap();
    pool
}

/// A complete, well-formed article document (print ISSN 0100-879X,
/// September 1999 issue)
pub fn sample_article_xml() -> Vec<u8> {
    r#"<?xml version="1.0" encoding="utf-8"?>
<article xmlns:xlink="http://www.w3.org/1999/xlink">
  <front>
    <journal-meta>
      <journal-id journal-id-type="nlm-ta">Braz J Med Biol Res</journal-id>
      <journal-title-group>
        <journal-title>Brazilian Journal of Medical and Biological Research</journal-title>
        <abbrev-journal-title abbrev-type="publisher">Braz. J. Med. Biol. Res.</abbrev-journal-title>
      </journal-title-group>
      <issn pub-type="ppub">0100-879X</issn>
      <issn pub-type="epub">1414-431X</issn>
      <publisher>
        <publisher-name>Associação Brasileira de Divulgação Científica</publisher-name>
      </publisher>
    </journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.1590/S0100-879X1999000900001</article-id>
      <article-categories>
        <subj-group subj-group-type="heading">
          <subject>Original Articles</subject>
        </subj-group>
      </article-categories>
      <title-group>
        <article-title>Cardiovascular responses in conscious rats</article-title>
      </title-group>
      <pub-date pub-type="ppub">
        <month>09</month>
        <year>1999</year>
      </pub-date>
      <volume>32</volume>
      <issue>9</issue>
      <permissions>
        <license xlink:href="http://creativecommons.org/licenses/by/4.0/">
          <license-p>Open access article.</license-p>
        </license>
      </permissions>
      <funding-group>
        <award-group>
          <award-id>99/1234-5</award-id>
        </award-group>
      </funding-group>
    </article-meta>
  </front>
  <back>
    <ack>
      <p>Research supported by grant 99/1234-5.</p>
    </ack>
    <ref-list>
      <ref id="B1">
        <element-citation publication-type="journal">
          <article-title>Baroreflex control of heart rate</article-title>
          <source>Hypertension</source>
          <year>1998</year>
        </element-citation>
      </ref>
      <ref id="B2">
        <element-citation publication-type="book">
          <source>The Rat Brain</source>
          <year>1986</year>
        </element-citation>
      </ref>
    </ref-list>
  </back>
</article>"#
        .as_bytes()
        .to_vec()
}

/// A package with one XML and one PDF member, the shape a valid submission
/// arrives in
pub fn valid_package(dir: &Path, file_name: &str) -> PathBuf {
    let xml = sample_article_xml();
    build_zip(
        dir,
        file_name,
        &[
            ("article.xml", xml.as_slice()),
            ("article.pdf", b"%PDF-1.4 fake body"),
            ("fig1.jpg", b"jpeg bytes"),
        ],
    )
}

/// Journal record matching [`sample_article_xml`]
pub fn sample_journal() -> JournalRecord {
    JournalRecord {
        reference: "j-1".into(),
        title: Some("Brazilian Journal of Medical and Biological Research".into()),
        print_issn: Some("0100-879X".into()),
        electronic_issn: Some("1414-431X".into()),
        publisher_name: Some("Associação Brasileira de Divulgação Científica".into()),
        abbreviated_title: Some("Braz. J. Med. Biol. Res.".into()),
        nlm_title: Some("Braz J Med Biol Res".into()),
    }
}

/// Issue record matching [`sample_article_xml`]: September 1999, no end
/// month, two registered sections
pub fn sample_issue() -> IssueRecord {
    IssueRecord {
        reference: "i-1".into(),
        label: "v32n9 (1999)".into(),
        year: Some(1999),
        volume: Some("32".into()),
        number: Some("9".into()),
        suppl_volume: None,
        suppl_number: None,
        publication_start_month: Some(9),
        publication_end_month: None,
        sections: vec!["Original Articles".into(), "Review Articles".into()],
    }
}

/// Pipeline item over the sample package with valid attempt and resolved
/// sample journal/issue context, as stages see it after setup
pub fn stage_item(dir: &Path) -> crate::pipeline::PipelineItem {
    let xml = sample_article_xml();
    stage_item_with_xml(dir, &xml)
}

/// Same, over a custom article document
pub fn stage_item_with_xml(dir: &Path, xml: &[u8]) -> crate::pipeline::PipelineItem {
    use crate::archive::{ArticlePackage, BibliographicExtractor, PackageGuard};

    let origin = build_zip(
        dir,
        "stage.zip",
        &[("article.xml", xml), ("article.pdf", b"%PDF-1.4")],
    );
    let mut package = ArticlePackage::open(&origin).unwrap();
    let doc = package.primary_document().ok();

    let mut attempt = crate::models::Attempt::candidate(
        "stage-checksum".into(),
        origin.display().to_string(),
        origin.display().to_string(),
    );
    attempt.is_valid = true;

    crate::pipeline::PipelineItem {
        attempt,
        package,
        guard: PackageGuard::new(&origin, None),
        doc,
        article: None,
        journal: Some(sample_journal()),
        issue: Some(sample_issue()),
        checkpoint: None,
        checkin_ref: None,
    }
}

/// Canned issue resolver for pipeline and stage tests
pub struct StubResolver {
    pub journal: Option<JournalRecord>,
    pub issue: Option<IssueRecord>,
    pub doi_registered: bool,
    pub fail_transport: bool,
}

impl StubResolver {
    /// Resolves the sample journal/issue and confirms DOI registration
    pub fn matching_sample() -> Self {
        Self {
            journal: Some(sample_journal()),
            issue: Some(sample_issue()),
            doi_registered: true,
            fail_transport: false,
        }
    }

    /// Resolves nothing
    pub fn empty() -> Self {
        Self {
            journal: None,
            issue: None,
            doi_registered: false,
            fail_transport: false,
        }
    }

    /// Every call fails with a transport error
    pub fn failing() -> Self {
        Self {
            journal: None,
            issue: None,
            doi_registered: false,
            fail_transport: true,
        }
    }
}

#[async_trait]
impl IssueResolver for StubResolver {
    async fn journal_by_issn(
        &self,
        _issn: &str,
    ) -> Result<Option<JournalRecord>, EditorialError> {
        if self.fail_transport {
            return Err(EditorialError::Network("connection refused".into()));
        }
        Ok(self.journal.clone())
    }

    async fn find_issue(
        &self,
        _journal: &JournalRecord,
        _criteria: &IssueCriteria,
    ) -> Result<Option<IssueRecord>, EditorialError> {
        if self.fail_transport {
            return Err(EditorialError::Network("connection refused".into()));
        }
        Ok(self.issue.clone())
    }

    async fn is_doi_registered(&self, _doi: &str) -> Result<bool, EditorialError> {
        if self.fail_transport {
            return Err(EditorialError::Network("connection refused".into()));
        }
        Ok(self.doi_registered)
    }
}
