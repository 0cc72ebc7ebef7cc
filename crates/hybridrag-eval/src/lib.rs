//! hybridrag-eval
//!
//! Recall@K and MRR over a gold question set, for any retrieval function,
//! plus comparison of several configurations against the same gold set.
pub mod compare;
pub mod evaluate;
pub mod metrics;

pub use compare::{best_config, render_comparison_table, save_results, ConfigResult};
pub use evaluate::{answer_id, dedupe_ranked, evaluate, load_gold, EvalReport};
pub use metrics::{aggregate, first_hit_rank, hit_at_k, reciprocal_rank, EvalMetrics, QuestionResult};
