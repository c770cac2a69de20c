//! BM25 full-text index over the manifest.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::snippet::SnippetGenerator;
use tantivy::{Index, TantivyDocument, Term};

use super::IndexError;
use crate::models::ManifestRecord;

/// Which retrieval strategy produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Lexical,
    Dense,
    Hybrid,
}

/// Snippet with highlight offsets into the fragment (not HTML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetSpan {
    pub fragment: String,
    pub highlights: Vec<(usize, usize)>,
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub sha256: String,
    pub path: String,
    pub custodian: String,
    pub doctype: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<SnippetSpan>,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
}

/// Optional search filters. Lookups against these fields are exact terms;
/// the review tags match documents an external classifier marked.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub custodian: Option<String>,
    pub doctype: Option<String>,
    pub privileged: Option<bool>,
    pub responsive: Option<bool>,
    pub production: Option<bool>,
}

#[derive(Clone, Copy)]
pub(crate) struct Fields {
    pub path: Field,
    pub sha256: Field,
    pub custodian: Field,
    pub doctype: Field,
    pub privileged: Field,
    pub responsive: Field,
    pub production: Field,
    pub text: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let path = builder.add_text_field("path", STRING | STORED);
    let sha256 = builder.add_text_field("sha256", STRING | STORED);
    let custodian = builder.add_text_field("custodian", STRING | STORED);
    let doctype = builder.add_text_field("doctype", STRING | STORED);
    let privileged = builder.add_text_field("privileged", STRING);
    let responsive = builder.add_text_field("responsive", STRING);
    let production = builder.add_text_field("production", STRING);
    let text = builder.add_text_field("text", TEXT | STORED);
    (
        builder.build(),
        Fields {
            path,
            sha256,
            custodian,
            doctype,
            privileged,
            responsive,
            production,
            text,
        },
    )
}

/// Review tags index as three-valued terms so an unreviewed document is
/// distinguishable from an explicit no.
fn tag_term(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "true",
        Some(false) => "false",
        None => "unset",
    }
}

/// Handle to a lexical index directory.
pub struct LexicalIndex {
    index: Index,
    pub(crate) fields: Fields,
}

impl LexicalIndex {
    /// Create a fresh index, replacing any existing artifacts.
    pub fn create(dir: &Path) -> Result<Self, IndexError> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();
        let index = Index::create_in_dir(dir, schema)?;
        Ok(Self { index, fields })
    }

    /// Open an existing index.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        if !dir.join("meta.json").exists() {
            return Err(IndexError::NotBuilt(dir.display().to_string()));
        }
        let index = Index::open_in_dir(dir)?;
        let (_, fields) = build_schema();
        Ok(Self { index, fields })
    }

    pub(crate) fn writer(
        &self,
    ) -> Result<tantivy::IndexWriter<TantivyDocument>, IndexError> {
        Ok(self.index.writer(64_000_000)?)
    }

    /// Map a manifest record to an index document. Pure function of the
    /// record, safe to run on any worker.
    pub(crate) fn document_for(fields: &Fields, record: &ManifestRecord) -> TantivyDocument {
        use tantivy::doc;
        doc!(
            fields.path => record.path_str(),
            fields.sha256 => record.document.sha256.clone(),
            fields.custodian => record.document.custodian.clone(),
            fields.doctype => record.document.doctype.as_str(),
            fields.privileged => tag_term(record.document.privileged),
            fields.responsive => tag_term(record.document.responsive),
            fields.production => tag_term(record.document.production),
            fields.text => record.document.text.clone(),
        )
    }

    /// BM25 search with optional exact-term filters.
    ///
    /// Results are ordered by descending score with ties broken on
    /// ascending sha256, so identical corpora yield identical orderings.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let reader = self.index.reader()?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let text_query = parser.parse_query(query)?;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
        if let Some(ref custodian) = filters.custodian {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.custodian, custodian),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        if let Some(ref doctype) = filters.doctype {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.doctype, doctype),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        for (field, value) in [
            (self.fields.privileged, filters.privileged),
            (self.fields.responsive, filters.responsive),
            (self.fields.production, filters.production),
        ] {
            if value.is_some() {
                clauses.push((
                    Occur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_text(field, tag_term(value)),
                        IndexRecordOption::Basic,
                    )),
                ));
            }
        }
        let full_query: Box<dyn Query> = if clauses.len() == 1 {
            clauses.pop().expect("one clause").1
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let mut snippets = SnippetGenerator::create(&searcher, &*full_query, self.fields.text)?;
        snippets.set_max_num_chars(240);

        let top = searcher.search(&full_query, &TopDocs::with_limit(limit.max(1)))?;
        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            let get = |field: Field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let snippet = {
                let s = snippets.snippet_from_doc(&doc);
                let fragment = s.fragment().to_string();
                if fragment.is_empty() {
                    None
                } else {
                    Some(SnippetSpan {
                        highlights: s
                            .highlighted()
                            .iter()
                            .map(|r| (r.start, r.end))
                            .collect(),
                        fragment,
                    })
                }
            };
            hits.push(SearchHit {
                sha256: get(self.fields.sha256),
                path: get(self.fields.path),
                custodian: get(self.fields.custodian),
                doctype: get(self.fields.doctype),
                score,
                snippet,
                strategy: Strategy::Lexical,
                lexical_score: Some(score),
                dense_score: None,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sha256.cmp(&b.sha256))
        });
        Ok(hits)
    }

    /// Fetch stored fields for a document by hash. Used to hydrate hits
    /// that only the dense index surfaced.
    pub fn lookup(&self, sha256: &str) -> Result<Option<SearchHit>, IndexError> {
        let reader = self.index.reader()?;
        let searcher = reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.sha256, sha256),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        let get = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Ok(Some(SearchHit {
            sha256: get(self.fields.sha256),
            path: get(self.fields.path),
            custodian: get(self.fields.custodian),
            doctype: get(self.fields.doctype),
            score: 0.0,
            snippet: None,
            strategy: Strategy::Dense,
            lexical_score: None,
            dense_score: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, Document};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(sha: &str, custodian: &str, text: &str) -> ManifestRecord {
        ManifestRecord::stamp(Document {
            sha256: sha.to_string(),
            path: PathBuf::from(format!("/case/{}/{}.txt", custodian, sha)),
            size: text.len() as u64,
            mtime: Utc::now(),
            mime_type: "text/plain".into(),
            custodian: custodian.into(),
            doctype: DocType::Text,
            text: text.into(),
            page_count: None,
            language: None,
            family_id: None,
            extraction_failed: false,
            privileged: None,
            responsive: None,
            production: None,
        })
        .unwrap()
    }

    fn build(dir: &Path, records: &[ManifestRecord]) -> LexicalIndex {
        let index = LexicalIndex::create(dir).unwrap();
        let mut writer = index.writer().unwrap();
        for r in records {
            writer
                .add_document(LexicalIndex::document_for(&index.fields, r))
                .unwrap();
        }
        writer.commit().unwrap();
        index
    }

    #[test]
    fn test_search_finds_matches() {
        let dir = tempfile::tempdir().unwrap();
        let index = build(
            dir.path(),
            &[
                record("aa", "smith", "quarterly merger discussion"),
                record("bb", "jones", "lunch menu"),
            ],
        );
        let hits = index
            .search("merger", &SearchFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sha256, "aa");
        assert_eq!(hits[0].strategy, Strategy::Lexical);
        assert!(hits[0].lexical_score.is_some());
        let snippet = hits[0].snippet.as_ref().unwrap();
        assert!(snippet.fragment.contains("merger"));
        assert!(!snippet.highlights.is_empty());
    }

    #[test]
    fn test_custodian_filter() {
        let dir = tempfile::tempdir().unwrap();
        let index = build(
            dir.path(),
            &[
                record("aa", "smith", "merger details"),
                record("bb", "jones", "merger summary"),
            ],
        );
        let hits = index
            .search(
                "merger",
                &SearchFilters {
                    custodian: Some("jones".into()),
                    ..SearchFilters::default()
                },
                10,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].custodian, "jones");
    }

    #[test]
    fn test_tie_break_on_sha256() {
        let dir = tempfile::tempdir().unwrap();
        // Identical text gives identical scores; order must be by hash.
        let index = build(
            dir.path(),
            &[
                record("ff", "smith", "identical body"),
                record("aa", "smith", "identical body"),
                record("cc", "smith", "identical body"),
            ],
        );
        let hits = index
            .search("identical", &SearchFilters::default(), 10)
            .unwrap();
        let shas: Vec<&str> = hits.iter().map(|h| h.sha256.as_str()).collect();
        assert_eq!(shas, vec!["aa", "cc", "ff"]);
    }

    #[test]
    fn test_lookup_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let index = build(dir.path(), &[record("aa", "smith", "hello world")]);
        let hit = index.lookup("aa").unwrap().unwrap();
        assert_eq!(hit.custodian, "smith");
        assert!(index.lookup("zz").unwrap().is_none());
    }

    #[test]
    fn test_privilege_tag_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut tagged = record("aa", "smith", "attorney advice memo");
        tagged.document.privileged = Some(true);
        let untagged = record("bb", "smith", "attorney advice summary");
        let index = build(dir.path(), &[tagged, untagged]);

        let privileged_only = index
            .search(
                "attorney",
                &SearchFilters {
                    privileged: Some(true),
                    ..SearchFilters::default()
                },
                10,
            )
            .unwrap();
        assert_eq!(privileged_only.len(), 1);
        assert_eq!(privileged_only[0].sha256, "aa");

        // Unreviewed documents are not "not privileged".
        let cleared = index
            .search(
                "attorney",
                &SearchFilters {
                    privileged: Some(false),
                    ..SearchFilters::default()
                },
                10,
            )
            .unwrap();
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_open_missing_index_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LexicalIndex::open(&dir.path().join("lexical")),
            Err(IndexError::NotBuilt(_))
        ));
    }
}
