use std::fmt::Display;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use ragdb_core::artifacts::{load_chunks, SubjectPaths};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Retriever;
use ragdb_core::types::{validate_query, Chunk, RetrievalConfig, RetrievalResult};

use crate::tantivy_utils::{build_schema, register_tokenizer, ROW_FIELD, TEXT_FIELD};

const WRITER_HEAP_BYTES: usize = 50_000_000;

fn lexical(e: impl Display) -> Error {
    Error::Operation(format!("lexical index: {e}"))
}

/// BM25 retriever over the raw text of a subject's chunks.
///
/// The index is built once in memory at construction and never modified.
/// Scores are min-max normalized over the returned results.
pub struct SparseRetriever {
    subject: String,
    chunks: Vec<Chunk>,
    index: Index,
    reader: IndexReader,
    text_field: Field,
    row_field: Field,
}

impl SparseRetriever {
    pub fn open(paths: &SubjectPaths) -> Result<Self> {
        let chunks = load_chunks(paths)?;
        Self::new(paths.subject(), chunks)
    }

    pub fn new(subject: &str, chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "subject '{subject}': cannot build a lexical index over zero chunks"
            )));
        }
        let schema = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizer(&index);
        let text_field = schema.get_field(TEXT_FIELD).map_err(lexical)?;
        let row_field = schema.get_field(ROW_FIELD).map_err(lexical)?;

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(lexical)?;
        for (row, chunk) in chunks.iter().enumerate() {
            writer
                .add_document(doc!(row_field => row as u64, text_field => chunk.text.as_str()))
                .map_err(lexical)?;
        }
        writer.commit().map_err(lexical)?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(lexical)?;

        info!(subject, chunks = chunks.len(), "sparse retriever ready");
        Ok(Self { subject: subject.to_string(), chunks, index, reader, text_field, row_field })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Tokenizes text exactly the way chunk text was indexed.
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.text_field).map_err(lexical)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while let Some(token) = stream.next() {
            tokens.push(token.text.clone());
        }
        Ok(tokens)
    }

    /// Raw BM25 score of every chunk sharing at least one term with `tokens`,
    /// ordered by score descending, then by row ascending.
    pub fn score(&self, tokens: &[String]) -> Result<Vec<(usize, f32)>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|t| {
                let term = Term::from_field_text(self.text_field, t);
                (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(self.chunks.len())).map_err(lexical)?;
        let mut scored = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(lexical)?;
            let row = doc
                .get_first(self.row_field)
                .and_then(|v| v.as_u64())
                .and_then(|r| usize::try_from(r).ok())
                .filter(|r| *r < self.chunks.len())
                .ok_or_else(|| {
                    Error::Consistency(format!("subject '{}': lexical hit without a valid row", self.subject))
                })?;
            scored.push((row, score));
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(scored)
    }
}

impl Retriever for SparseRetriever {
    fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<RetrievalResult>> {
        validate_query(query)?;
        let tokens = self.tokenize(query)?;
        let mut scored = self.score(&tokens)?;
        scored.truncate(config.top_k());

        let raw: Vec<f32> = scored.iter().map(|(_, s)| *s).collect();
        let normalized = min_max_normalize(&raw);
        let results: Vec<RetrievalResult> = scored
            .iter()
            .zip(normalized)
            .map(|((row, _), score)| {
                let chunk = &self.chunks[*row];
                RetrievalResult::from_metadata(&chunk.id, &chunk.metadata, score)
            })
            .collect();

        debug!(
            subject = %self.subject,
            tokens = tokens.len(),
            top_k = config.top_k(),
            results = results.len(),
            "sparse retrieval"
        );
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "sparse"
    }
}

/// Min-max normalization into `[0, 1]` over the given scores only.
///
/// When every score is equal (including a single score) each one maps to
/// exactly `1.0`.
pub fn min_max_normalize(raw: &[f32]) -> Vec<f32> {
    let Some(first) = raw.first() else {
        return Vec::new();
    };
    let (min, max) = raw.iter().fold((*first, *first), |(lo, hi), s| (lo.min(*s), hi.max(*s)));
    if max == min {
        return vec![1.0; raw.len()];
    }
    let span = max - min;
    raw.iter().map(|s| ((s - min) / span).clamp(0.0, 1.0)).collect()
}
