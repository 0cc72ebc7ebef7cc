//! Wiring shared by the `hybridrag-*` binaries: logging, settings and
//! component construction.
use anyhow::{bail, Context, Result};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use hybridrag_core::config::{expand_path, Config, Settings};
use hybridrag_core::traits::Embedder;
use hybridrag_core::types::{Filter, FusedResult, SearchHit};
use hybridrag_embed::provider_from_settings;
use hybridrag_hybrid::HybridSearchEngine;
use hybridrag_vector::{CreateMode, VectorIndex};

/// Logs go to stderr. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn load_settings() -> Result<Settings> {
    let config = Config::load().context("loading configuration")?;
    Ok(config.settings()?)
}

pub async fn open_index(settings: &Settings) -> Result<VectorIndex> {
    let dir = expand_path(&settings.data.db_dir);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let uri = dir.to_str().context("database path is not valid UTF-8")?;
    let index = VectorIndex::open(uri, &settings.index).await?;
    Ok(index.with_progress(std::io::stderr().is_terminal()))
}

/// Hybrid engine over `collection`, with BM25 built from the stored chunks.
pub async fn build_engine(
    settings: &Settings,
    index: &VectorIndex,
    collection: &str,
    embedder: Arc<dyn Embedder>,
) -> Result<HybridSearchEngine> {
    let engine = HybridSearchEngine::new(
        embedder,
        Arc::new(index.collection(collection)),
        settings.hybrid.clone(),
        settings.bm25.clone(),
    );
    let entries = index.scroll(collection, None, None).await?;
    engine.rebuild_sparse(entries)?;
    Ok(engine)
}

pub fn embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(provider_from_settings(&settings.embedding)?)
}

/// Parses repeated `key=value` arguments into one conjunctive filter.
pub fn parse_filter(pairs: &[String]) -> Result<Option<Filter>> {
    let mut filter = Filter::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("filter `{pair}` is not key=value");
        };
        if key.trim().is_empty() {
            bail!("filter `{pair}` has an empty key");
        }
        filter = filter.eq(key.trim(), value.trim());
    }
    Ok((!filter.is_empty()).then_some(filter))
}

/// How to (re)create `collection`: an existing one is only dropped with
/// `confirmed`.
pub fn recreate_mode(collection: &str, exists: bool, confirmed: bool) -> Result<CreateMode> {
    match (exists, confirmed) {
        (false, _) => Ok(CreateMode::IfMissing),
        (true, true) => Ok(CreateMode::Recreate { confirm: true }),
        (true, false) => bail!("collection `{collection}` already exists and would be recreated; pass --yes to confirm"),
    }
}

/// Parses `name=chunk_size`.
pub fn parse_chunk_config(spec: &str) -> Result<(String, usize)> {
    let (name, size) = spec.split_once('=').with_context(|| format!("config `{spec}` is not name=chunk_size"))?;
    let size: usize = size.trim().parse().with_context(|| format!("chunk size in `{spec}` is not a number"))?;
    if name.trim().is_empty() || size == 0 {
        bail!("config `{spec}` needs a name and a positive chunk size");
    }
    Ok((name.trim().to_string(), size))
}

fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{cut}...")
}

pub fn print_fused(query: &str, results: &[FusedResult]) {
    println!("\nFound {} results for: \"{query}\"", results.len());
    for (i, r) in results.iter().enumerate() {
        let rank = |r: Option<usize>| r.map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "\n  {}. score={:.5}  id={}  dense={}  bm25={}",
            i + 1,
            r.score,
            r.id,
            rank(r.dense_rank),
            rank(r.sparse_rank)
        );
        if let Some(p) = &r.payload {
            println!("     doc={}  chunk={}/{}  source={}", p.doc_id, p.chunk_index + 1, p.total_chunks, p.data_source);
            println!("     {}", preview(&p.text, 200));
        }
    }
}

pub fn print_hits(query: &str, hits: &[SearchHit]) {
    println!("\nFound {} results for: \"{query}\"", hits.len());
    for (i, h) in hits.iter().enumerate() {
        println!("\n  {}. score={:.4}  id={}", i + 1, h.score, h.id);
        if let Some(p) = &h.payload {
            println!("     doc={}  chunk={}/{}  source={}", p.doc_id, p.chunk_index + 1, p.total_chunks, p.data_source);
            println!("     {}", preview(&p.text, 200));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_parse_into_one_conjunction() {
        let f = parse_filter(&["data_source=fraud".into(), "country = KR".into()])
            .expect("parse")
            .expect("non-empty");
        assert_eq!(f.must.get("data_source").map(String::as_str), Some("fraud"));
        assert_eq!(f.must.get("country").map(String::as_str), Some("KR"));
        assert!(parse_filter(&[]).expect("empty").is_none());
        assert!(parse_filter(&["nokey".into()]).is_err());
        assert!(parse_filter(&["=x".into()]).is_err());
    }

    #[test]
    fn chunk_configs_need_name_and_size() {
        assert_eq!(parse_chunk_config("small=300").expect("parse"), ("small".to_string(), 300));
        assert!(parse_chunk_config("small").is_err());
        assert!(parse_chunk_config("small=abc").is_err());
        assert!(parse_chunk_config("small=0").is_err());
    }

    #[test]
    fn existing_collections_are_only_recreated_when_confirmed() {
        assert_eq!(recreate_mode("docs_small", false, false).expect("new"), CreateMode::IfMissing);
        assert_eq!(
            recreate_mode("docs_small", true, true).expect("confirmed"),
            CreateMode::Recreate { confirm: true }
        );
        let err = recreate_mode("docs_small", true, false).expect_err("unconfirmed");
        assert!(err.to_string().contains("--yes"));
    }

    #[test]
    fn previews_are_flattened_and_cut_on_chars() {
        assert_eq!(preview("a\n b  c", 10), "a b c");
        assert_eq!(preview("가나다라마", 2), "가나...");
    }
}
