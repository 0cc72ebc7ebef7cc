//! Chunk, embed and upsert a JSON/JSONL document file into a collection.
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use hybridrag_cli::{embedder, init_tracing, load_settings, open_index};
use hybridrag_core::config::expand_path;
use hybridrag_core::document::load_documents;
use hybridrag_embed::chunker_from_settings;
use hybridrag_vector::{CollectionSpec, CreateMode, IngestOptions};

#[derive(Parser)]
#[command(name = "hybridrag-index", version, about)]
struct Cli {
    /// Documents file (JSON array or JSON lines). Defaults to `data.documents`.
    documents: Option<PathBuf>,

    /// Target collection. Defaults to `index.collection`.
    #[arg(long)]
    collection: Option<String>,

    /// Corpus tag stored on every point. Defaults to `index.data_source`.
    #[arg(long)]
    data_source: Option<String>,

    /// Delete this data source's points before writing
    #[arg(long)]
    replace: bool,

    /// Drop and recreate the collection (needs --yes)
    #[arg(long)]
    recreate: bool,

    /// Confirm destructive operations
    #[arg(long)]
    yes: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut settings = load_settings()?;
    if let Some(c) = cli.collection {
        settings.index.collection = c;
    }
    if let Some(s) = cli.data_source {
        settings.index.data_source = s;
    }
    if cli.recreate && !cli.yes {
        bail!("--recreate deletes every point in `{}`; pass --yes to confirm", settings.index.collection);
    }

    let path = match cli.documents {
        Some(p) => p,
        None => expand_path(settings.data.documents.as_deref().context("no documents file given and data.documents is unset")?),
    };
    let docs = load_documents(&path, &settings.data.text_source)?;
    tracing::info!(documents = docs.len(), path = %path.display(), "loaded documents");

    let chunker = chunker_from_settings(&settings.chunking)?;
    let embedder = embedder(&settings)?;
    let index = open_index(&settings).await?;
    let collection = settings.index.collection.clone();

    if cli.recreate {
        let spec = CollectionSpec::new(&collection, embedder.dim()).with_payload_fields(settings.index.payload_fields.clone());
        index.create_collection(&spec, CreateMode::Recreate { confirm: cli.yes }).await?;
    }

    let opts = IngestOptions {
        data_source: settings.index.data_source.clone(),
        id_strategy: settings.index.id_strategy,
        replace_existing: cli.replace,
        payload_fields: settings.index.payload_fields.clone(),
    };
    let report = index.ingest(&collection, &docs, chunker.as_ref(), embedder.as_ref(), &opts).await?;

    let info = index.get_info(&collection).await?;
    println!("Indexed {} documents as {} chunks into `{}`", report.documents, report.chunks, collection);
    if cli.replace {
        println!("Replaced {} previous points for data source `{}`", report.replaced, opts.data_source);
    }
    println!(
        "Collection now holds {} points (dim {}, {}, model {})",
        info.points_count,
        info.vector_size,
        info.distance,
        info.embedding_model.as_deref().unwrap_or("-")
    );
    Ok(())
}
