//! Side-by-side comparison of retrieval configurations.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use hybridrag_core::error::Result;

use crate::evaluate::EvalReport;
use crate::metrics::EvalMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigResult {
    pub name: String,
    pub report: EvalReport,
}

impl ConfigResult {
    pub fn new(name: impl Into<String>, report: EvalReport) -> Self {
        Self { name: name.into(), report }
    }

    pub fn metrics(&self) -> &EvalMetrics {
        &self.report.metrics
    }
}

/// Best configuration by recall@3, then MRR. The earlier entry wins a full tie.
pub fn best_config(results: &[ConfigResult]) -> Option<&ConfigResult> {
    let mut best: Option<&ConfigResult> = None;
    for r in results {
        let better = best.map_or(true, |b| {
            let key = |c: &ConfigResult| (c.metrics().selection_recall(), c.metrics().mrr);
            let (r3, mrr) = key(r);
            let (b3, bmrr) = key(b);
            r3 > b3 || (r3 == b3 && mrr > bmrr)
        });
        if better {
            best = Some(r);
        }
    }
    best
}

/// Persists `config name -> metrics` as pretty JSON. Per-question details
/// are not written.
pub fn save_results(path: &Path, results: &[ConfigResult]) -> Result<()> {
    let summary: BTreeMap<&str, &EvalMetrics> = results.iter().map(|r| (r.name.as_str(), r.metrics())).collect();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(&summary)?)?;
    tracing::info!(path = %path.display(), configs = results.len(), "saved evaluation summary");
    Ok(())
}

/// Fixed-width comparison table; the best configuration is starred.
pub fn render_comparison_table(results: &[ConfigResult]) -> String {
    let ks: BTreeSet<usize> = results.iter().flat_map(|r| r.metrics().recall_at_k.keys().copied()).collect();
    let best = best_config(results).map(|b| b.name.as_str());
    let width = results.iter().map(|r| r.name.len()).max().unwrap_or(0).max(6) + 2;

    let mut out = String::new();
    let _ = write!(out, "{:<width$}", "Config");
    for k in &ks {
        let _ = write!(out, " {:>10}", format!("Recall@{k}"));
    }
    let _ = writeln!(out, " {:>8}", "MRR");
    let _ = writeln!(out, "{}", "-".repeat(width + ks.len() * 11 + 9));

    for r in results {
        let marker = if Some(r.name.as_str()) == best { "*" } else { " " };
        let _ = write!(out, "{:<width$}", format!("{marker}{}", r.name));
        for k in &ks {
            match r.metrics().recall(*k) {
                Some(v) => {
                    let _ = write!(out, " {:>9.2}%", v * 100.0);
                }
                None => {
                    let _ = write!(out, " {:>10}", "-");
                }
            }
        }
        let _ = writeln!(out, " {:>8.4}", r.metrics().mrr);
    }
    out
}
