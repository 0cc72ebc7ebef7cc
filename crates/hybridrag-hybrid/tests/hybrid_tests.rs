use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use hybridrag_core::config::{Bm25Settings, FuseBy, HybridSettings};
use hybridrag_core::error::Result;
use hybridrag_core::traits::{Embedder, VectorSearch};
use hybridrag_core::types::{Filter, Payload, SearchHit, SearchParams, SourceKind};
use hybridrag_embed::FakeEmbedder;
use hybridrag_hybrid::{HybridQuery, HybridSearchEngine};

fn payload(doc_id: &str, text: &str, source: &str) -> Payload {
    Payload {
        text: text.into(),
        doc_id: doc_id.into(),
        data_source: source.into(),
        total_chunks: 1,
        ..Payload::default()
    }
}

/// Returns the same ranking for every query; records the requested depth.
struct FixedDense {
    hits: Vec<SearchHit>,
    last_top_k: Mutex<Option<usize>>,
}

impl FixedDense {
    fn new(ranked: &[(&str, f32, Payload)]) -> Self {
        let hits = ranked
            .iter()
            .map(|(id, score, p)| SearchHit {
                id: (*id).into(),
                score: *score,
                source: SourceKind::Vector,
                payload: Some(p.clone()),
            })
            .collect();
        Self { hits, last_top_k: Mutex::new(None) }
    }
}

#[async_trait]
impl VectorSearch for FixedDense {
    async fn search(&self, _query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        *self.last_top_k.lock().expect("lock") = Some(params.top_k);
        Ok(self
            .hits
            .iter()
            .filter(|h| {
                let p = h.payload.as_ref().expect("payload");
                params.filter.as_ref().map_or(true, |f| f.matches(p))
                    && params.score_threshold.map_or(true, |t| h.score >= t)
            })
            .take(params.top_k)
            .cloned()
            .collect())
    }
}

/// Brute-force cosine search over texts embedded with the fake embedder.
struct MemoryDense {
    points: Vec<(String, Vec<f32>, Payload)>,
}

impl MemoryDense {
    fn new(embedder: &FakeEmbedder, docs: &[(&str, &str)]) -> Self {
        let points = docs
            .iter()
            .map(|(id, text)| ((*id).to_string(), embedder.embed_text(text), payload(id, text, "corpus")))
            .collect();
        Self { points }
    }
}

#[async_trait]
impl VectorSearch for MemoryDense {
    async fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .points
            .iter()
            .map(|(id, v, p)| SearchHit {
                id: id.clone(),
                score: v.iter().zip(query).map(|(a, b)| a * b).sum(),
                source: SourceKind::Vector,
                payload: Some(p.clone()),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(params.top_k);
        Ok(hits)
    }
}

/// Query "steel tariff" ranks B, A, D under BM25; the rest never match.
fn sparse_corpus() -> Vec<(String, Payload)> {
    [
        ("A", "steel tariff report annual summary", "trade"),
        ("B", "steel tariff steel tariff", "trade"),
        ("C", "fraud manual", "fraud"),
        ("D", "steel", "fraud"),
        ("E", "customs office", "trade"),
        ("F", "invoice check", "trade"),
        ("G", "harbor logistics", "trade"),
        ("H", "border control", "trade"),
    ]
    .iter()
    .map(|(id, text, src)| ((*id).to_string(), payload(id, text, src)))
    .collect()
}

fn engine_with(dense: Arc<dyn VectorSearch>, settings: HybridSettings) -> HybridSearchEngine {
    HybridSearchEngine::new(Arc::new(FakeEmbedder::new(16)), dense, settings, Bm25Settings::default())
}

fn abc_dense() -> Arc<FixedDense> {
    let corpus = sparse_corpus();
    let p = |id: &str| corpus.iter().find(|(i, _)| i == id).map(|(_, p)| p.clone()).expect("known id");
    Arc::new(FixedDense::new(&[("A", 0.9, p("A")), ("B", 0.8, p("B")), ("C", 0.7, p("C"))]))
}

fn ids(results: &[hybridrag_core::types::FusedResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn fused_ranking_sums_both_lists() {
    let dense = abc_dense();
    let engine = engine_with(dense.clone(), HybridSettings::default());
    assert_eq!(engine.rebuild_sparse(sparse_corpus()).expect("rebuild"), 8);

    let opts = HybridQuery::from_settings(engine.settings()).top(4);
    let fused = engine.hybrid_search("steel tariff", &opts).await.expect("search");

    assert_eq!(ids(&fused), vec!["A", "B", "C", "D"]);
    assert!((fused[0].score - (0.7 / 61.0 + 0.3 / 62.0)).abs() < 1e-12);
    assert!((fused[1].score - (0.7 / 62.0 + 0.3 / 61.0)).abs() < 1e-12);
    assert_eq!((fused[0].dense_rank, fused[0].sparse_rank), (Some(1), Some(2)));
    assert_eq!((fused[3].dense_rank, fused[3].sparse_rank), (None, Some(3)));
    assert_eq!(fused[3].payload.as_ref().map(|p| p.text.as_str()), Some("steel"));
    assert_eq!(*dense.last_top_k.lock().expect("lock"), Some(12));
}

#[tokio::test]
async fn without_sparse_index_results_match_dense_search() {
    let engine = engine_with(abc_dense(), HybridSettings::default());
    assert!(!engine.has_sparse());

    let opts = HybridQuery::from_settings(engine.settings()).top(2);
    let fused = engine.hybrid_search("steel tariff", &opts).await.expect("search");
    let dense = engine.search("steel tariff", &SearchParams::top(2)).await.expect("dense");

    assert_eq!(ids(&fused), dense.iter().map(|h| h.id.as_str()).collect::<Vec<_>>());
    assert!(fused.iter().all(|r| r.sparse_rank.is_none()));
}

#[tokio::test]
async fn cleared_sparse_index_falls_back_again() {
    let engine = engine_with(abc_dense(), HybridSettings::default());
    engine.rebuild_sparse(sparse_corpus()).expect("rebuild");
    assert!(engine.has_sparse());
    engine.clear_sparse();
    assert!(!engine.has_sparse());

    let opts = HybridQuery::from_settings(engine.settings()).top(5);
    let fused = engine.hybrid_search("steel tariff", &opts).await.expect("search");
    assert_eq!(ids(&fused), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn filter_restricts_both_legs() {
    let engine = engine_with(abc_dense(), HybridSettings::default());
    engine.rebuild_sparse(sparse_corpus()).expect("rebuild");

    let opts = HybridQuery::from_settings(engine.settings()).top(5).with_filter(Filter::data_source("fraud"));
    let fused = engine.hybrid_search("steel tariff", &opts).await.expect("search");
    assert_eq!(ids(&fused), vec!["C", "D"]);
}

#[tokio::test]
async fn nothing_found_anywhere_is_empty_not_an_error() {
    let engine = engine_with(Arc::new(FixedDense::new(&[])), HybridSettings::default());
    engine.rebuild_sparse(sparse_corpus()).expect("rebuild");
    let opts = HybridQuery::from_settings(engine.settings());
    assert!(engine.hybrid_search("zebra", &opts).await.expect("search").is_empty());
    assert!(engine.hybrid_search("steel", &opts.clone().top(0)).await.expect("k0").is_empty());
}

#[tokio::test]
async fn fusing_by_document_merges_chunks() {
    let chunk = |doc: &str, text: &str| payload(doc, text, "trade");
    let dense = Arc::new(FixedDense::new(&[
        ("p1", 0.9, chunk("doc-1", "steel tariff")),
        ("p2", 0.8, chunk("doc-2", "fraud manual")),
        ("p3", 0.7, chunk("doc-1", "tariff table")),
    ]));
    let settings = HybridSettings { fuse_by: FuseBy::DocId, ..HybridSettings::default() };
    let engine = engine_with(dense, settings);

    let opts = HybridQuery::from_settings(engine.settings()).top(5);
    let fused = engine.hybrid_search("steel", &opts).await.expect("search");
    assert_eq!(ids(&fused), vec!["doc-1", "doc-2"]);
    assert!((fused[0].score - (0.7 / 61.0 + 0.7 / 63.0)).abs() < 1e-12);
    assert_eq!(fused[0].dense_rank, Some(1));
}

#[tokio::test]
async fn multi_search_merges_branches_by_best_score() {
    let embedder = FakeEmbedder::new(64);
    let docs = [
        ("a", "steel tariff schedule"),
        ("b", "customs fraud manual"),
        ("c", "steel import quota"),
        ("d", "fraud investigation report"),
    ];
    let dense = Arc::new(MemoryDense::new(&embedder, &docs));
    let engine = HybridSearchEngine::new(
        Arc::new(embedder.clone()),
        dense.clone(),
        HybridSettings::default(),
        Bm25Settings::default(),
    );

    let queries = vec!["steel tariff schedule".to_string(), "customs fraud manual".to_string()];
    let merged = engine.multi_search(&queries, Some(1)).await.expect("multi");
    assert_eq!(merged.len(), 2);
    let mut got: Vec<&str> = merged.iter().map(|h| h.id.as_str()).collect();
    got.sort_unstable();
    assert_eq!(got, vec!["a", "b"]);
    assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));

    let wide = engine.multi_search(&queries, Some(4)).await.expect("multi");
    assert_eq!(wide.len(), 4);
    for hit in &wide {
        let single = embedder.embed_one(&queries[0]).await.expect("embed");
        let other = embedder.embed_one(&queries[1]).await.expect("embed");
        let a = dense.search(&single, &SearchParams::top(4)).await.expect("search");
        let b = dense.search(&other, &SearchParams::top(4)).await.expect("search");
        let best = a
            .iter()
            .chain(b.iter())
            .filter(|h| h.id == hit.id)
            .map(|h| h.score)
            .fold(f32::MIN, f32::max);
        assert!((hit.score - best).abs() < 1e-6);
    }

    assert!(engine.multi_search(&[], None).await.expect("empty").is_empty());
}

#[tokio::test]
async fn multi_search_applies_filter_and_threshold_to_every_branch() {
    let dense = Arc::new(FixedDense::new(&[
        ("a", 0.9, payload("a", "steel tariff", "fraud")),
        ("b", 0.8, payload("b", "customs office", "trade")),
        ("c", 0.3, payload("c", "fraud manual", "fraud")),
    ]));
    let engine = engine_with(dense.clone(), HybridSettings::default());
    let queries = vec!["steel".to_string(), "fraud".to_string()];

    let all = engine.multi_search_with(&queries, &SearchParams::top(5)).await.expect("multi");
    assert_eq!(all.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);

    let scoped = SearchParams::top(5).with_filter(Filter::data_source("fraud")).with_threshold(0.5);
    let hits = engine.multi_search_with(&queries, &scoped).await.expect("multi");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(*dense.last_top_k.lock().expect("lock"), Some(5));
}

#[tokio::test]
async fn sparse_search_returns_bm25_hits_with_payloads() {
    let engine = engine_with(abc_dense(), HybridSettings::default());
    assert!(engine.sparse_search("steel tariff", None, 5).is_empty());

    engine.rebuild_sparse(sparse_corpus()).expect("rebuild");
    let hits = engine.sparse_search("steel tariff", None, 5);
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["B", "A", "D"]);
    assert!(hits.iter().all(|h| h.source == SourceKind::Text && h.score > 0.0));
    assert_eq!(hits[2].payload.as_ref().map(|p| p.data_source.as_str()), Some("fraud"));

    let fraud = engine.sparse_search("steel tariff", Some(&Filter::data_source("fraud")), 5);
    assert_eq!(fraud.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["D"]);
    assert_eq!(engine.sparse_search("steel tariff", None, 1).len(), 1);
}
