use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use ragdb_core::artifacts::{write_json, SubjectPaths};
use ragdb_core::traits::{Embedder, Retriever};
use ragdb_core::types::{Chunk, ChunkMetadata, RetrievalConfig, VectorRecord};
use ragdb_core::Error;
use ragdb_embed::HashEmbedder;
use ragdb_vector::{write_dense_artifacts, DenseRetriever, FlatIpIndex, SENTINEL_ROW};

/// Returns the vector registered for a query, optionally after a delay.
struct StubEmbedder {
    dim: usize,
    vectors: Vec<(&'static str, Vec<f32>)>,
    delay: Option<Duration>,
}

impl StubEmbedder {
    fn new(dim: usize, vectors: Vec<(&'static str, Vec<f32>)>) -> Self {
        Self { dim, vectors, delay: None }
    }
}

impl Embedder for StubEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .iter()
                    .find(|(q, _)| *q == t.as_str())
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| anyhow::anyhow!("embedding service rejected '{t}'"))
            })
            .collect()
    }
}

fn record(id: &str, page: u32) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        metadata: ChunkMetadata {
            subject: "demo".to_string(),
            source_id: "guide".to_string(),
            source_title: "Guide".to_string(),
            page,
            chunk_index: 0,
            start_char: 0,
            end_char: 10,
        },
    }
}

fn chunk(id: &str, text: &str) -> Chunk {
    let r = record(id, 1);
    Chunk { id: r.id, text: text.to_string(), metadata: r.metadata }
}

fn three_row_retriever(embedder: StubEmbedder) -> DenseRetriever {
    let index = FlatIpIndex::build(&[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]]).unwrap();
    let records = vec![record("c0", 1), record("c1", 2), record("c2", 3)];
    DenseRetriever::new("demo", index, records, Arc::new(embedder)).unwrap()
}

#[test]
fn build_rejects_empty_ragged_and_non_finite_input() {
    assert!(matches!(FlatIpIndex::build(&[]), Err(Error::InvalidInput(_))));
    assert!(matches!(FlatIpIndex::build(&[vec![]]), Err(Error::InvalidInput(_))));
    assert!(matches!(FlatIpIndex::build(&[vec![1.0, 0.0], vec![1.0]]), Err(Error::Consistency(_))));
    assert!(matches!(FlatIpIndex::build(&[vec![1.0, f32::NAN]]), Err(Error::InvalidInput(_))));
}

#[test]
fn search_orders_by_score_then_row_and_pads_with_sentinels() {
    let index = FlatIpIndex::build(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let hits = index.search(&[0.0, 1.0], 5).unwrap();
    assert_eq!(hits.rows, vec![0, 2, 1, SENTINEL_ROW, SENTINEL_ROW]);
    assert_eq!(&hits.scores[..3], &[1.0, 1.0, 0.0]);
    assert_eq!(hits.scores[3], f32::MIN);

    let top1 = index.search(&[1.0, 0.0], 1).unwrap();
    assert_eq!(top1.rows, vec![1]);

    assert!(matches!(index.search(&[1.0], 1), Err(Error::Consistency(_))));
    assert!(matches!(index.search(&[1.0, 0.0], 0), Err(Error::InvalidConfig(_))));
}

#[test]
fn load_rejects_inconsistent_index_files() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "demo");
    assert!(matches!(FlatIpIndex::load(&paths), Err(Error::MissingArtifact { .. })));

    let index = FlatIpIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    index.save(&paths.index()).unwrap();
    let loaded = FlatIpIndex::load(&paths).unwrap();
    assert_eq!((loaded.len(), loaded.dim()), (2, 2));
    assert_eq!(loaded.row(1), Some(&[0.0f32, 1.0][..]));

    fs::write(
        paths.index(),
        r#"{"version": 1, "metric": "inner_product", "dim": 2, "rows": 2, "data": [1.0, 0.0, 0.0]}"#,
    )
    .unwrap();
    assert!(matches!(FlatIpIndex::load(&paths), Err(Error::MalformedArtifact { .. })));

    fs::write(paths.index(), r#"{"version": 1, "metric": "l2", "dim": 1, "rows": 1, "data": [1.0]}"#).unwrap();
    assert!(matches!(FlatIpIndex::load(&paths), Err(Error::MalformedArtifact { .. })));
}

#[test]
fn dense_returns_raw_cosine_scores_in_rank_order() {
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![("aws", vec![2.0, 0.0])]));
    let results = retriever.retrieve("aws", &RetrievalConfig::new(2).unwrap()).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["c0", "c1"]);
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!((results[1].score - 0.6).abs() < 1e-6);
    assert_eq!(results[1].page, 2);
    assert_eq!(results[1].source_id, "guide");
}

#[test]
fn dense_never_pads_past_the_corpus() {
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![("aws", vec![0.0, 1.0])]));
    let results = retriever.retrieve("aws", &RetrievalConfig::new(10).unwrap()).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
}

#[test]
fn zero_query_embedding_is_a_validation_error() {
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![("nothing", vec![0.0, 0.0])]));
    let err = retriever.retrieve("nothing", &RetrievalConfig::new(3).unwrap()).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "got {err}");
}

#[test]
fn blank_query_is_rejected_before_embedding() {
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![]));
    let err = retriever.retrieve("  ", &RetrievalConfig::new(3).unwrap()).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn embedding_failures_surface_as_upstream_errors() {
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![]));
    let err = retriever.retrieve("unknown", &RetrievalConfig::new(3).unwrap()).unwrap_err();
    match err {
        Error::Upstream { stage, message } => {
            assert_eq!(stage, "embedding");
            assert!(message.contains("demo"), "message names the subject: {message}");
        }
        other => panic!("expected upstream error, got {other}"),
    }
}

#[test]
fn wrong_query_dimension_is_a_consistency_error() {
    // The embedder claims 2 dims but returns 3 for this query.
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![("odd", vec![1.0, 0.0, 0.0])]));
    let err = retriever.retrieve("odd", &RetrievalConfig::new(3).unwrap()).unwrap_err();
    assert!(matches!(err, Error::Consistency(_)), "got {err}");
}

#[test]
fn slow_embedding_times_out() {
    let mut embedder = StubEmbedder::new(2, vec![("aws", vec![1.0, 0.0])]);
    embedder.delay = Some(Duration::from_millis(500));
    let retriever = three_row_retriever(embedder).with_embed_timeout(Duration::from_millis(20));
    let err = retriever.retrieve("aws", &RetrievalConfig::new(3).unwrap()).unwrap_err();
    assert!(matches!(err, Error::Upstream { .. }), "got {err}");
    assert!(err.to_string().contains("timed out"));
}

#[test]
fn fast_embedding_within_timeout_succeeds() {
    let retriever = three_row_retriever(StubEmbedder::new(2, vec![("aws", vec![1.0, 0.0])]))
        .with_embed_timeout(Duration::from_secs(5));
    let results = retriever.retrieve("aws", &RetrievalConfig::new(1).unwrap()).unwrap();
    assert_eq!(results[0].id, "c0");
}

#[test]
fn construction_checks_metadata_and_embedder_shape() {
    let index = FlatIpIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let err = DenseRetriever::new("demo", index.clone(), vec![record("c0", 1)], Arc::new(HashEmbedder::new(2)))
        .err()
        .expect("metadata count mismatch");
    assert!(matches!(err, Error::Consistency(_)));

    let err = DenseRetriever::new("demo", index, vec![record("c0", 1), record("c1", 1)], Arc::new(HashEmbedder::new(3)))
        .err()
        .expect("embedder dim mismatch");
    assert!(matches!(err, Error::Consistency(_)));
}

#[test]
fn written_artifacts_open_and_answer_queries() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "cloud");
    let embedder = Arc::new(HashEmbedder::new(128));
    let chunks = vec![
        chunk("cloud_waf_p1_c0", "The AWS Well-Architected Framework has six pillars"),
        chunk("cloud_k8s_p1_c0", "Kubernetes schedules pods onto nodes"),
        chunk("cloud_tf_p1_c0", "Terraform state files track managed infrastructure"),
    ];

    let written = write_dense_artifacts(&paths, &chunks, embedder.as_ref(), 2).unwrap();
    assert_eq!((written.rows, written.dim), (3, 128));

    let retriever = DenseRetriever::open(&paths, embedder.clone()).unwrap();
    assert_eq!(retriever.len(), 3);
    let query = "aws well-architected framework pillars";
    let results = retriever.retrieve(query, &RetrievalConfig::new(3).unwrap()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, "cloud_waf_p1_c0");

    let again = retriever.retrieve(query, &RetrievalConfig::new(3).unwrap()).unwrap();
    assert_eq!(results, again, "identical calls give identical results");
}

#[test]
fn open_fails_fast_on_missing_or_mismatched_artifacts() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "cloud");
    let embedder = Arc::new(HashEmbedder::new(16));

    let err = DenseRetriever::open(&paths, embedder.clone()).err().expect("nothing on disk");
    assert!(matches!(err, Error::MissingArtifact { .. }));

    let chunks = vec![chunk("a", "alpha text"), chunk("b", "bravo text")];
    write_dense_artifacts(&paths, &chunks, embedder.as_ref(), 8).unwrap();

    write_json(&paths.vector_metadata(), &vec![record("a", 1)]).unwrap();
    let err = DenseRetriever::open(&paths, embedder.clone()).err().expect("metadata rows differ");
    assert!(matches!(err, Error::Consistency(_)), "got {err}");

    write_json(&paths.vector_metadata(), &vec![record("a", 1), record("b", 1)]).unwrap();
    write_json(&paths.embeddings(), &vec![vec![1.0f32; 16]]).unwrap();
    let err = DenseRetriever::open(&paths, embedder.clone()).err().expect("matrix rows differ");
    assert!(matches!(err, Error::Consistency(_)), "got {err}");

    fs::remove_file(paths.embeddings()).unwrap();
    let err = DenseRetriever::open(&paths, embedder).err().expect("matrix missing");
    assert!(matches!(err, Error::MissingArtifact { .. }));
}

#[test]
fn artifact_writer_rejects_empty_corpus_and_zero_vectors() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "empty");
    let embedder = HashEmbedder::new(8);
    assert!(matches!(write_dense_artifacts(&paths, &[], &embedder, 4), Err(Error::InvalidInput(_))));

    let zero = StubEmbedder::new(2, vec![("blank", vec![0.0, 0.0])]);
    let err = write_dense_artifacts(&paths, &[chunk("z", "blank")], &zero, 4).unwrap_err();
    assert!(err.to_string().contains("row 0"), "got {err}");
}

#[test]
fn top_k_beyond_corpus_returns_every_row_without_padding() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "cloud");
    let embedder = Arc::new(HashEmbedder::new(32));
    let chunks = vec![chunk("a", "lambda functions"), chunk("b", "object storage"), chunk("c", "message queues")];
    write_dense_artifacts(&paths, &chunks, embedder.as_ref(), 2).unwrap();
    let retriever = DenseRetriever::open(&paths, embedder).unwrap();

    for top_k in [4, 1_000_000_000, usize::MAX] {
        let results = retriever.retrieve("lambda functions", &RetrievalConfig::new(top_k).unwrap()).unwrap();
        assert_eq!(results.len(), 3, "top_k={top_k}");
    }
}

#[test]
fn unallocatable_k_is_a_config_error() {
    let index = FlatIpIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let err = index.search(&[1.0, 0.0], usize::MAX).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err}");
}

#[test]
fn open_refuses_dense_artifacts_from_another_chunk_store() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "cloud");
    let embedder = Arc::new(HashEmbedder::new(16));
    let chunks = vec![chunk("a", "alpha text"), chunk("b", "bravo text")];
    write_dense_artifacts(&paths, &chunks, embedder.as_ref(), 8).unwrap();

    write_json(&paths.chunks(), &chunks).unwrap();
    assert!(DenseRetriever::open(&paths, embedder.clone()).is_ok());

    let reingested = vec![chunk("x", "x-ray text"), chunk("y", "yankee text"), chunk("z", "zulu text")];
    write_json(&paths.chunks(), &reingested).unwrap();
    let err = DenseRetriever::open(&paths, embedder.clone()).err().expect("row counts differ");
    assert!(matches!(err, Error::Consistency(_)), "got {err}");
    assert!(err.to_string().contains("3 chunks") && err.to_string().contains("2 rows"), "got {err}");

    let reordered = vec![chunks[1].clone(), chunks[0].clone()];
    write_json(&paths.chunks(), &reordered).unwrap();
    let err = DenseRetriever::open(&paths, embedder).err().expect("row order differs");
    assert!(matches!(err, Error::Consistency(_)), "got {err}");
}

#[test]
fn open_rejects_duplicate_metadata_ids() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "cloud");
    let embedder = Arc::new(HashEmbedder::new(16));
    write_dense_artifacts(&paths, &[chunk("a", "alpha text"), chunk("b", "bravo text")], embedder.as_ref(), 8)
        .unwrap();

    write_json(&paths.vector_metadata(), &vec![record("a", 1), record("a", 2)]).unwrap();
    let err = DenseRetriever::open(&paths, embedder).err().expect("duplicate ids");
    assert!(matches!(err, Error::MalformedArtifact { .. }), "got {err}");
}
