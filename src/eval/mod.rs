//! Composed image retrieval evaluation: prediction, ranking, labeling and Recall@K.

pub mod evaluator;
pub mod label;
pub mod metrics;
pub mod predict;
pub mod protocol;
pub mod rank;
pub mod report;

pub use evaluator::{EvalSettings, MetricsEvaluator};
pub use label::{label, label_groups, Labels};
pub use metrics::{aggregate, mean, recall_at_k};
pub use predict::{predict, PredictionBatch};
pub use protocol::EvalProtocol;
pub use rank::{exclude_reference, rank, rank_chunked, RankedResult};
pub use report::{MetricsReport, RunReport};
