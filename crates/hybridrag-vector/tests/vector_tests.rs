use hybridrag_core::chunker::CharChunker;
use hybridrag_core::config::{IdStrategy, IndexSettings};
use hybridrag_core::document::{record_to_document, TextSource};
use hybridrag_core::error::Error;
use hybridrag_core::traits::{Embedder, VectorSearch};
use hybridrag_core::types::{Document, Fields, Filter, Payload, Point, SearchParams};
use hybridrag_embed::FakeEmbedder;
use hybridrag_vector::{CollectionSpec, CreateMode, CreateOutcome, IngestOptions, VectorIndex};
use tempfile::TempDir;

const DIM: usize = 4;

async fn open(tmp: &TempDir) -> VectorIndex {
    let settings = IndexSettings { upsert_batch_size: 2, ..IndexSettings::default() };
    VectorIndex::open(tmp.path().to_str().expect("utf8 path"), &settings)
        .await
        .expect("open")
        .with_progress(false)
}

fn point(id: &str, vector: [f32; DIM], source: &str, country: &str) -> Point {
    let mut fields = Fields::new();
    fields.insert("country".into(), country.into());
    Point {
        id: id.into(),
        vector: vector.to_vec(),
        payload: Payload {
            text: format!("text of {id}"),
            doc_id: format!("doc-{id}"),
            data_source: source.into(),
            total_chunks: 1,
            fields,
            embedding_model: "unit".into(),
            embedding_provider: "test".into(),
            ..Payload::default()
        },
    }
}

fn corpus() -> Vec<Point> {
    vec![
        point("a", [1.0, 0.0, 0.0, 0.0], "fraud", "KR"),
        point("b", [0.0, 1.0, 0.0, 0.0], "fraud", "US"),
        point("c", [0.6, 0.8, 0.0, 0.0], "manual", "KR"),
    ]
}

async fn seeded(tmp: &TempDir) -> VectorIndex {
    let index = open(tmp).await;
    let spec = CollectionSpec::new("docs", DIM).with_payload_fields(vec!["country".into()]);
    index.create_collection(&spec, CreateMode::IfMissing).await.expect("create");
    index.upsert("docs", &corpus()).await.expect("upsert");
    index
}

#[tokio::test]
async fn create_collection_is_idempotent() {
    let tmp = TempDir::new().expect("tmp");
    let index = open(&tmp).await;
    let spec = CollectionSpec::new("docs", DIM);
    assert_eq!(index.create_collection(&spec, CreateMode::IfMissing).await.expect("first"), CreateOutcome::Created);
    assert_eq!(
        index.create_collection(&spec, CreateMode::IfMissing).await.expect("second"),
        CreateOutcome::AlreadyExists
    );
    assert!(index.collection_exists("docs").await.expect("exists"));

    let wrong = CollectionSpec::new("docs", DIM + 1);
    let err = index.create_collection(&wrong, CreateMode::IfMissing).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 5, actual: 4 }));
}

#[tokio::test]
async fn recreate_requires_confirmation_and_empties_the_collection() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;
    let spec = CollectionSpec::new("docs", DIM);

    let err = index.create_collection(&spec, CreateMode::Recreate { confirm: false }).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(index.count("docs", None).await.expect("count"), 3);

    let outcome = index.create_collection(&spec, CreateMode::Recreate { confirm: true }).await.expect("recreate");
    assert_eq!(outcome, CreateOutcome::Recreated);
    assert_eq!(index.count("docs", None).await.expect("count"), 0);
}

#[tokio::test]
async fn upserting_the_same_ids_twice_overwrites() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;

    let mut again = corpus();
    again[0].payload.text = "rewritten".into();
    let report = index.upsert("docs", &again).await.expect("upsert again");
    assert_eq!(report.written, 3);
    assert_eq!(report.batches, 2);
    assert_eq!(index.count("docs", None).await.expect("count"), 3);

    let got = index.retrieve("docs", &["a".to_string()]).await.expect("retrieve");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload.text, "rewritten");
    assert_eq!(got[0].vector, vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(got[0].payload.fields.get("country").map(String::as_str), Some("KR"));
}

#[tokio::test]
async fn upsert_rejects_wrong_dimension_before_writing() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;
    let mut bad = point("z", [1.0, 0.0, 0.0, 0.0], "fraud", "KR");
    bad.vector.push(0.0);
    let err = index.upsert("docs", &[bad]).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 5 }));
    assert_eq!(index.count("docs", None).await.expect("count"), 3);
}

#[tokio::test]
async fn search_orders_by_cosine_similarity() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;

    let hits = index.search("docs", &[1.0, 0.0, 0.0, 0.0], &SearchParams::top(3)).await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert!((hits[1].score - 0.6).abs() < 1e-4);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].payload.as_ref().map(|p| p.doc_id.as_str()), Some("doc-a"));

    assert!(index.search("docs", &[1.0, 0.0, 0.0, 0.0], &SearchParams::top(0)).await.expect("k0").is_empty());
}

#[tokio::test]
async fn search_applies_filter_and_threshold() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;
    let query = [1.0, 0.0, 0.0, 0.0];

    let thresholded = index.search("docs", &query, &SearchParams::top(3).with_threshold(0.5)).await.expect("search");
    assert_eq!(thresholded.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);

    let fraud = index
        .search("docs", &query, &SearchParams::top(3).with_filter(Filter::data_source("fraud")))
        .await
        .expect("search");
    assert_eq!(fraud.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

    let kr_manual = Filter::new().eq("country", "KR").eq("data_source", "manual");
    let hits = index.search("docs", &query, &SearchParams::top(3).with_filter(kr_manual)).await.expect("search");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["c"]);

    let unknown = Filter::new().eq("colour", "red");
    let err = index.search("docs", &query, &SearchParams::top(3).with_filter(unknown)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidFilter(_)));
}

#[tokio::test]
async fn collection_handle_searches_through_the_trait() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;
    let dense = index.collection("docs");
    let hits = VectorSearch::search(&dense, &[0.0, 1.0, 0.0, 0.0], &SearchParams::top(1)).await.expect("search");
    assert_eq!(hits[0].id, "b");
}

#[tokio::test]
async fn missing_collection_is_reported() {
    let tmp = TempDir::new().expect("tmp");
    let index = open(&tmp).await;
    let err = index.search("nope", &[1.0, 0.0, 0.0, 0.0], &SearchParams::top(3)).await.unwrap_err();
    assert!(matches!(err, Error::CollectionNotFound(_)));
}

#[tokio::test]
async fn delete_by_filter_returns_removed_count() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;

    let err = index.delete_by_filter("docs", &Filter::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidFilter(_)));

    assert_eq!(index.delete_by_filter("docs", &Filter::data_source("fraud")).await.expect("delete"), 2);
    assert_eq!(index.delete_by_filter("docs", &Filter::data_source("fraud")).await.expect("again"), 0);
    let left = index.scroll("docs", None, None).await.expect("scroll");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].0, "c");
}

#[tokio::test]
async fn get_info_reports_shape_and_provenance() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;
    let info = index.get_info("docs").await.expect("info");
    assert_eq!(info.points_count, 3);
    assert_eq!(info.vector_size, DIM);
    assert_eq!(info.distance, "cosine");
    assert_eq!(info.payload_fields, vec!["country".to_string()]);
    assert_eq!(info.embedding_model.as_deref(), Some("unit"));
    assert_eq!(info.embedding_provider.as_deref(), Some("test"));
}

#[tokio::test]
async fn scroll_honours_filter_and_limit() {
    let tmp = TempDir::new().expect("tmp");
    let index = seeded(&tmp).await;
    let kr = index.scroll("docs", Some(&Filter::new().eq("country", "KR")), None).await.expect("scroll");
    let mut ids: Vec<String> = kr.into_iter().map(|(id, _)| id).collect();
    ids.sort();
    assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
    assert_eq!(index.scroll("docs", None, Some(1)).await.expect("scroll").len(), 1);
}

fn docs() -> Vec<Document> {
    let mut fields = Fields::new();
    fields.insert("country".into(), "KR".into());
    vec![
        Document { id: "d1".into(), fields: fields.clone(), body: "customs fraud manual for steel imports".into() },
        Document { id: "d2".into(), fields, body: "tariff schedule".into() },
    ]
}

#[tokio::test]
async fn ingest_chunks_embeds_and_replaces_by_data_source() {
    let tmp = TempDir::new().expect("tmp");
    let index = open(&tmp).await;
    let embedder = FakeEmbedder::new(32);
    let chunker = CharChunker::new(Some(20), 5).expect("chunker");
    let opts = IngestOptions {
        id_strategy: IdStrategy::Deterministic,
        payload_fields: vec!["country".into()],
        ..IngestOptions::new("fraud")
    };

    let first = index.ingest("corpus", &docs(), &chunker, &embedder, &opts).await.expect("ingest");
    assert_eq!(first.documents, 2);
    assert!(first.chunks > 2);
    assert_eq!(first.written, first.chunks);
    assert_eq!(index.count("corpus", None).await.expect("count"), first.chunks);

    // Deterministic ids: a plain re-run overwrites in place.
    let second = index.ingest("corpus", &docs(), &chunker, &embedder, &opts).await.expect("ingest again");
    assert_eq!(second.replaced, 0);
    assert_eq!(index.count("corpus", None).await.expect("count"), first.chunks);

    let replace = IngestOptions { replace_existing: true, ..opts.clone() };
    let third = index.ingest("corpus", &docs()[1..], &chunker, &embedder, &replace).await.expect("replace");
    assert_eq!(third.replaced, first.chunks);
    assert_eq!(index.count("corpus", None).await.expect("count"), third.chunks);

    let (_, payload) = index.scroll("corpus", None, Some(1)).await.expect("scroll").remove(0);
    assert_eq!(payload.doc_id, "d2");
    assert_eq!(payload.data_source, "fraud");
    assert_eq!(payload.embedding_model, embedder.model());
    assert_eq!(payload.embedding_provider, "fake");
    assert!(payload.indexed_at.is_some());

    let query = embedder.embed_one("tariff schedule").await.expect("embed");
    let hits = index.search("corpus", &query, &SearchParams::top(1)).await.expect("search");
    assert_eq!(hits[0].payload.as_ref().map(|p| p.doc_id.as_str()), Some("d2"));
}

#[tokio::test]
async fn stored_chunks_do_not_repeat_the_document_body() {
    let tmp = TempDir::new().expect("tmp");
    let index = open(&tmp).await;
    let record = serde_json::json!({"id": "long", "country": "KR", "text": "steel tar ".repeat(450)});
    let doc = record_to_document(record.as_object().expect("object"), &TextSource::Auto, 1)
        .expect("ok")
        .expect("doc");
    let chunker = CharChunker::new(Some(500), 50).expect("chunker");
    let opts = IngestOptions { payload_fields: vec!["country".into()], ..IngestOptions::new("trade") };

    let report = index.ingest("long", &[doc], &chunker, &FakeEmbedder::new(8), &opts).await.expect("ingest");
    assert_eq!(report.chunks, 10);

    let stored = index.scroll("long", None, None).await.expect("scroll");
    assert_eq!(stored.len(), 10);
    for (_, payload) in &stored {
        let field_bytes = serde_json::to_string(&payload.fields).expect("json").len();
        assert!(field_bytes < 64, "chunk {} stores {field_bytes} bytes of fields", payload.chunk_index);
        assert_eq!(payload.get("country").as_deref(), Some("KR"));
    }
}
