//! Hybrid (BM25 + dense) search over an indexed collection.
//!
//! ```bash
//! hybridrag-search "steel import certificate" --top-k 5
//! hybridrag-search "fraud manual" --filter data_source=fraud --json
//! hybridrag-search "origin rules" "tariff exemptions"   # multi-query fan-out
//! ```
use anyhow::Result;
use clap::Parser;

use hybridrag_cli::{build_engine, embedder, init_tracing, load_settings, open_index, parse_filter, print_fused, print_hits};
use hybridrag_core::types::SearchParams;
use hybridrag_hybrid::{HybridQuery, HybridSearchEngine};

#[derive(Parser)]
#[command(name = "hybridrag-search", version, about)]
struct Cli {
    /// One query, or several to merge with the multi-query fan-out
    #[arg(required = true)]
    queries: Vec<String>,

    /// Results to return. Defaults to `hybrid.top_k`.
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Skip BM25 and return the dense ranking
    #[arg(long)]
    dense_only: bool,

    /// Exact-match payload filter, repeatable: --filter data_source=fraud
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Minimum cosine similarity for dense hits
    #[arg(long)]
    threshold: Option<f32>,

    /// Collection to search. Defaults to `index.collection`.
    #[arg(long)]
    collection: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = load_settings()?;
    let collection = cli.collection.clone().unwrap_or_else(|| settings.index.collection.clone());
    let top_k = cli.top_k.unwrap_or(settings.hybrid.top_k);
    let filter = parse_filter(&cli.filters)?;

    let embedder = embedder(&settings)?;
    let index = open_index(&settings).await?;

    let engine = if cli.dense_only || cli.queries.len() > 1 {
        HybridSearchEngine::new(
            embedder,
            std::sync::Arc::new(index.collection(&collection)),
            settings.hybrid.clone(),
            settings.bm25.clone(),
        )
    } else {
        build_engine(&settings, &index, &collection, embedder).await?
    };

    // Several queries always run dense-only, so `--dense-only` changes nothing here.
    if cli.queries.len() > 1 {
        let params = SearchParams { top_k, filter, score_threshold: cli.threshold };
        let hits = engine.multi_search_with(&cli.queries, &params).await?;
        let label = cli.queries.join(" | ");
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&hits)?);
        } else {
            print_hits(&label, &hits);
        }
        return Ok(());
    }

    let query = &cli.queries[0];
    if cli.dense_only {
        let params = SearchParams { top_k, filter, score_threshold: cli.threshold };
        let hits = engine.search(query, &params).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&hits)?);
        } else {
            print_hits(query, &hits);
        }
        return Ok(());
    }

    let mut opts = HybridQuery::from_settings(&settings.hybrid).top(top_k);
    opts.filter = filter;
    opts.score_threshold = cli.threshold;
    let results = engine.hybrid_search(query, &opts).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_fused(query, &results);
    }
    Ok(())
}
