use std::fs;

use tempfile::TempDir;

use ragdb_core::artifacts::{load_chunks, load_vector_metadata, write_json, SubjectPaths};
use ragdb_core::config::{Config, DenseScoreMode};
use ragdb_core::corpus::load_corpus;
use ragdb_core::normalize::{l2_norm, l2_normalize, l2_normalize_rows};
use ragdb_core::types::{validate_query, Chunk, ChunkMetadata, RetrievalConfig, VectorRecord};
use ragdb_core::Error;

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        metadata: ChunkMetadata {
            subject: "demo".to_string(),
            source_id: "doc".to_string(),
            source_title: "Doc".to_string(),
            page: 1,
            chunk_index: 0,
            start_char: 0,
            end_char: text.len(),
        },
    }
}

#[test]
fn normalizing_a_unit_vector_is_a_no_op() {
    let v = l2_normalize(&[3.0, 4.0]).expect("normalize");
    assert!((l2_norm(&v) - 1.0).abs() <= 1e-6);
    let again = l2_normalize(&v).expect("normalize twice");
    for (a, b) in v.iter().zip(again.iter()) {
        assert!((a - b).abs() <= f32::EPSILON, "a={a} b={b}");
    }
}

#[test]
fn normalize_rejects_zero_and_non_finite_vectors() {
    assert!(matches!(l2_normalize(&[0.0, 0.0, 0.0]), Err(Error::InvalidInput(_))));
    assert!(matches!(l2_normalize(&[1.0, f32::NAN]), Err(Error::InvalidInput(_))));
    assert!(matches!(l2_normalize(&[f32::INFINITY, 1.0]), Err(Error::InvalidInput(_))));
    assert!(matches!(l2_normalize(&[]), Err(Error::InvalidInput(_))));

    let err = l2_normalize_rows(&[vec![1.0, 0.0], vec![0.0, 0.0]]).unwrap_err();
    assert!(err.to_string().contains("row 1"), "error names the row: {err}");
}

#[test]
fn retrieval_config_validates_top_k_and_alpha() {
    assert!(matches!(RetrievalConfig::new(0), Err(Error::InvalidConfig(_))));
    let cfg = RetrievalConfig::new(3).expect("config");
    assert_eq!(cfg.top_k(), 3);
    assert_eq!(cfg.alpha(), None);
    assert!(matches!(cfg.with_alpha(1.5), Err(Error::InvalidConfig(_))));
    assert!(matches!(cfg.with_alpha(-0.1), Err(Error::InvalidConfig(_))));
    assert_eq!(cfg.with_alpha(0.0).expect("alpha 0").alpha(), Some(0.0));
    assert_eq!(cfg.with_alpha(1.0).expect("alpha 1").alpha(), Some(1.0));
}

#[test]
fn blank_queries_are_input_errors() {
    let err = validate_query("   \n\t").unwrap_err();
    assert!(err.is_input_error());
    assert!(validate_query(" fire ").is_ok());
}

#[test]
fn vector_record_flattens_chunk_metadata() {
    let c = chunk("demo_doc_p1_c0", "hello");
    let json = serde_json::to_value(VectorRecord::from(&c)).expect("serialize");
    assert_eq!(json["id"], "demo_doc_p1_c0");
    assert_eq!(json["source_id"], "doc");
    assert_eq!(json["page"], 1);
    assert!(json.get("metadata").is_none());
}

#[test]
fn load_chunks_preserves_order_and_rejects_duplicates() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "demo");

    let err = load_chunks(&paths).unwrap_err();
    assert!(matches!(err, Error::MissingArtifact { .. }), "got {err}");

    write_json(&paths.chunks(), &vec![chunk("b", "second"), chunk("a", "first")]).unwrap();
    let loaded = load_chunks(&paths).expect("load");
    let ids: Vec<&str> = loaded.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["b", "a"]);

    write_json(&paths.chunks(), &vec![chunk("a", "one"), chunk("a", "two")]).unwrap();
    assert!(matches!(load_chunks(&paths), Err(Error::MalformedArtifact { .. })));

    write_json(&paths.chunks(), &vec![chunk("a", "  ")]).unwrap();
    assert!(matches!(load_chunks(&paths), Err(Error::MalformedArtifact { .. })));

    fs::write(paths.chunks(), "{ not json").unwrap();
    assert!(matches!(load_chunks(&paths), Err(Error::MalformedArtifact { .. })));
}

#[test]
fn vector_metadata_rejects_duplicate_ids() {
    let tmp = TempDir::new().unwrap();
    let paths = SubjectPaths::new(tmp.path(), "demo");
    let records: Vec<VectorRecord> = [chunk("a", "one"), chunk("b", "two")].iter().map(VectorRecord::from).collect();
    write_json(&paths.vector_metadata(), &records).unwrap();
    assert_eq!(load_vector_metadata(&paths).expect("load").len(), 2);

    let duplicated = vec![records[0].clone(), records[1].clone(), records[0].clone()];
    write_json(&paths.vector_metadata(), &duplicated).unwrap();
    let err = load_vector_metadata(&paths).unwrap_err();
    assert!(matches!(err, Error::MalformedArtifact { .. }), "got {err}");
    assert!(err.to_string().contains("row 2"), "got {err}");
}

#[test]
fn corpus_registry_lookup() {
    let tmp = TempDir::new().unwrap();
    let registry = tmp.path().join("corpus_registry.json");

    assert!(matches!(load_corpus(&registry, "cloud"), Err(Error::MissingArtifact { .. })));

    fs::write(
        &registry,
        r#"{"cloud": {"sources": [{"id": "waf", "title": "Well-Architected", "path": "raw/waf.pdf"}]},
            "broken": {"sources": [{"id": "x"}]}}"#,
    )
    .unwrap();
    let sources = load_corpus(&registry, "cloud").expect("sources");
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].title, "Well-Architected");

    assert!(matches!(load_corpus(&registry, "missing"), Err(Error::NotFound(_))));
    assert!(matches!(load_corpus(&registry, "broken"), Err(Error::MalformedArtifact { .. })));
}

#[test]
fn config_layers_files_and_env() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("RUST_ENV", "test");
        jail.create_file(
            "config.toml",
            r#"
            [data]
            dir = "artifacts"

            [retrieval]
            top_k = 4

            [retrieval.strategy]
            type = "hybrid"
            subject = "cloud"
            alpha = 0.3
            "#,
        )?;
        jail.create_file("config.test.toml", "[embedding]\nfake = true\ndim = 64\n")?;
        jail.set_env("APP_RETRIEVAL__TOP_K", "9");
        jail.set_env("APP_RETRIEVAL__STRATEGY__DENSE_SCORES", "clip");

        let config = Config::load().map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(config.env_name(), "test");
        assert_eq!(settings.data.dir, "artifacts");
        assert_eq!(settings.data.registry, "data/corpus_registry.json");
        assert_eq!(settings.retrieval.top_k, 9);
        assert_eq!(settings.retrieval.strategy.kind, "hybrid");
        assert_eq!(settings.retrieval.strategy.alpha, Some(0.3));
        assert_eq!(settings.retrieval.strategy.dense_scores, DenseScoreMode::Clip);
        assert!(settings.embedding.fake);
        assert_eq!(settings.embedding.dim, 64);
        let subject: String = config.get("retrieval.strategy.subject").map_err(|e| e.to_string())?;
        assert_eq!(subject, "cloud");
        Ok(())
    });
}

#[test]
fn production_rejects_fake_embeddings() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("RUST_ENV", "prod");
        jail.create_file("config.prod.toml", "[embedding]\nfake = true\n")?;
        assert!(Config::load().is_err());
        Ok(())
    });
}
