//! Recall@K / MRR of dense-only and hybrid retrieval against a gold set.
//!
//! Without `--config`, the configured collection is evaluated as is. Each
//! `--config name=chunk_size` re-ingests `data.documents` into its own
//! collection with that chunk size and evaluates it too. Existing variant
//! collections are only replaced with `--yes`.
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use hybridrag_cli::{build_engine, embedder, init_tracing, load_settings, open_index, parse_chunk_config, recreate_mode};
use hybridrag_core::chunker::CharChunker;
use hybridrag_core::config::{expand_path, Settings};
use hybridrag_core::document::load_documents;
use hybridrag_core::traits::Embedder;
use hybridrag_core::types::{EvalRecord, SearchParams};
use hybridrag_eval::{
    answer_id, best_config, dedupe_ranked, evaluate, load_gold, render_comparison_table, save_results, ConfigResult,
};
use hybridrag_hybrid::{HybridQuery, HybridSearchEngine};
use hybridrag_vector::{CollectionSpec, IngestOptions, VectorIndex};

#[derive(Parser)]
#[command(name = "hybridrag-eval", version, about)]
struct Cli {
    /// Gold set (JSON array or JSON lines). Defaults to `data.gold`.
    gold: Option<PathBuf>,

    /// Chunking configuration to compare, repeatable: --config small=300
    #[arg(long = "config")]
    configs: Vec<String>,

    /// Where to write the summary JSON. Defaults to `eval.output`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Allow --config to recreate variant collections that already exist
    #[arg(long)]
    yes: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

async fn evaluate_engine(
    settings: &Settings,
    engine: &HybridSearchEngine,
    gold: &[EvalRecord],
    name: &str,
) -> Result<Vec<ConfigResult>> {
    let depth = settings.eval.k_values.iter().copied().max().unwrap_or(5);
    let id_field = settings.eval.id_field.as_str();

    let dense = evaluate(gold, &settings.eval.k_values, |q| async move {
        let hits = engine.search(&q, &SearchParams::top(depth)).await?;
        Ok(dedupe_ranked(hits.iter().map(|h| answer_id(&h.id, h.payload.as_ref(), id_field))))
    })
    .await?;

    let opts = HybridQuery::from_settings(&settings.hybrid).top(depth);
    let opts = &opts;
    let hybrid = evaluate(gold, &settings.eval.k_values, |q| async move {
        let results = engine.hybrid_search(&q, opts).await?;
        Ok(dedupe_ranked(results.iter().map(|r| answer_id(&r.id, r.payload.as_ref(), id_field))))
    })
    .await?;

    Ok(vec![
        ConfigResult::new(format!("{name}/dense"), dense),
        ConfigResult::new(format!("{name}/hybrid"), hybrid),
    ])
}

fn variant_collection(settings: &Settings, name: &str) -> String {
    format!("{}_{name}", settings.index.collection)
}

/// Re-ingests the corpus into `<collection>_<name>` chunked at `size`.
async fn ingest_variant(
    settings: &Settings,
    index: &VectorIndex,
    embedder: &Arc<dyn Embedder>,
    name: &str,
    size: usize,
    confirmed: bool,
) -> Result<String> {
    let path = settings.data.documents.as_deref().context("--config needs data.documents to re-ingest")?;
    let docs = load_documents(&expand_path(path), &settings.data.text_source)?;
    let overlap = settings.chunking.resolved_overlap();
    let overlap = if overlap < size { overlap } else { size / 10 };
    let chunker = CharChunker::new(Some(size), overlap)?;

    let collection = variant_collection(settings, name);
    let mode = recreate_mode(&collection, index.collection_exists(&collection).await?, confirmed)?;
    let spec = CollectionSpec::new(&collection, embedder.dim()).with_payload_fields(settings.index.payload_fields.clone());
    index.create_collection(&spec, mode).await?;
    let opts = IngestOptions {
        data_source: settings.index.data_source.clone(),
        id_strategy: settings.index.id_strategy,
        replace_existing: false,
        payload_fields: settings.index.payload_fields.clone(),
    };
    let report = index.ingest(&collection, &docs, &chunker, embedder.as_ref(), &opts).await?;
    tracing::info!(config = name, size, overlap, chunks = report.chunks, "ingested variant");
    Ok(collection)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = load_settings()?;

    let gold_path = match cli.gold {
        Some(p) => p,
        None => expand_path(settings.data.gold.as_deref().context("no gold file given and data.gold is unset")?),
    };
    let gold = load_gold(&gold_path)?;
    tracing::info!(questions = gold.len(), path = %gold_path.display(), "loaded gold set");

    let embedder = embedder(&settings)?;
    let index = open_index(&settings).await?;

    let variants = cli.configs.iter().map(|c| parse_chunk_config(c)).collect::<Result<Vec<_>>>()?;
    // refuse before any variant is rebuilt, not halfway through
    for (name, _) in &variants {
        let collection = variant_collection(&settings, name);
        recreate_mode(&collection, index.collection_exists(&collection).await?, cli.yes)?;
    }

    let mut results = Vec::new();
    if variants.is_empty() {
        let collection = settings.index.collection.clone();
        let engine = build_engine(&settings, &index, &collection, embedder.clone()).await?;
        results.extend(evaluate_engine(&settings, &engine, &gold, &collection).await?);
    }
    for (name, size) in &variants {
        let collection = ingest_variant(&settings, &index, &embedder, name, *size, cli.yes).await?;
        let engine = build_engine(&settings, &index, &collection, embedder.clone()).await?;
        results.extend(evaluate_engine(&settings, &engine, &gold, name).await?);
    }

    println!("{}", render_comparison_table(&results));
    if let Some(best) = best_config(&results) {
        println!(
            "Best configuration: {} (selection recall {:.2}%, MRR {:.4})",
            best.name,
            best.metrics().selection_recall() * 100.0,
            best.metrics().mrr
        );
    }

    let output = cli.output.or_else(|| settings.eval.output.as_deref().map(expand_path));
    if let Some(path) = output {
        save_results(&path, &results)?;
        println!("Summary written to {}", path.display());
    }
    Ok(())
}
