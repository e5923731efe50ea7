//! The Metrics Evaluator: predict, rank, label and aggregate under one protocol.

use super::label::{label, label_groups};
use super::metrics::aggregate;
use super::predict::predict;
use super::protocol::EvalProtocol;
use super::rank::{exclude_reference, rank_chunked};
use super::report::MetricsReport;
use crate::config::EvalConfig;
use crate::dataset::Query;
use crate::embeddings::EmbeddingProvider;
use crate::error::{CirevalError, Result};
use crate::index::IndexFeatures;

/// Evaluation knobs that do not change the metrics.
#[derive(Debug, Clone)]
pub struct EvalSettings {
    pub batch_size: usize,
    pub rank_threads: usize,
    pub verify_unit_norm: bool,
    pub unit_norm_tolerance: f32,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self::from(&EvalConfig::default())
    }
}

impl From<&EvalConfig> for EvalSettings {
    fn from(config: &EvalConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            rank_threads: config.rank_threads,
            verify_unit_norm: config.verify_unit_norm,
            unit_norm_tolerance: config.unit_norm_tolerance,
        }
    }
}

/// Computes retrieval metrics of a validation split against a fixed index.
///
/// The provider is injected; the evaluator holds no model or device state of its own.
pub struct MetricsEvaluator<P> {
    provider: P,
    protocol: EvalProtocol,
    settings: EvalSettings,
}

impl<P: EmbeddingProvider> MetricsEvaluator<P> {
    pub fn new(provider: P, protocol: EvalProtocol, settings: EvalSettings) -> Self {
        Self {
            provider,
            protocol,
            settings,
        }
    }

    /// Evaluate `queries` against `index` and return the metrics under `label`.
    pub async fn evaluate(
        &self,
        label_name: &str,
        queries: &[Query],
        index: &IndexFeatures,
    ) -> Result<MetricsReport> {
        let start = std::time::Instant::now();
        if queries.is_empty() {
            return Err(CirevalError::InvalidInput(format!("{}: no queries to evaluate", label_name)));
        }
        if index.is_empty() {
            return Err(CirevalError::InvalidInput(format!("{}: index is empty", label_name)));
        }
        if self.settings.verify_unit_norm {
            index.verify_unit_norm(self.settings.unit_norm_tolerance)?;
        }

        let groups: Option<Vec<Vec<String>>> = if self.protocol.has_groups {
            let groups = queries
                .iter()
                .enumerate()
                .map(|(row, q)| {
                    q.group.clone().ok_or_else(|| {
                        CirevalError::InvalidInput(format!(
                            "{}: query {} has no candidate group",
                            label_name, row
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Some(groups)
        } else {
            None
        };

        log::info!("Computing {} predictions for {} queries", label_name, queries.len());
        let predictions = predict(&self.provider, queries, index, self.settings.batch_size).await?;

        log::info!("Computing the distances and sorting the results");
        let mut ranked = rank_chunked(&predictions.features, index, self.settings.rank_threads)?;
        if self.protocol.excludes_reference {
            ranked = exclude_reference(ranked, &predictions.references, index)?;
        }

        log::info!("Computing the ground-truth labels wrt the predictions");
        let labels = label(&ranked, &predictions.targets, index)?;
        let group_recall = match &groups {
            Some(groups) => {
                let group_labels = label_groups(&ranked, groups, &predictions.targets, index)?;
                Some(aggregate(&group_labels, &self.protocol.group_cutoffs))
            }
            None => None,
        };

        let report = MetricsReport {
            label: label_name.to_string(),
            queries: queries.len(),
            index_size: index.len(),
            recall: aggregate(&labels, &self.protocol.cutoffs),
            group_recall,
        };
        log::info!("Evaluated {} in {:?}", label_name, start.elapsed());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{index_of, MockProvider};

    fn query(reference: &str, target: &str, caption: &str, group: Option<&[&str]>) -> Query {
        Query {
            reference: reference.to_string(),
            target: target.to_string(),
            captions: vec![caption.to_string()],
            group: group.map(|g| g.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn settings() -> EvalSettings {
        EvalSettings {
            batch_size: 2,
            rank_threads: 1,
            verify_unit_norm: true,
            unit_norm_tolerance: 1e-3,
        }
    }

    #[tokio::test]
    async fn test_fashion_iq_scenario() {
        // index {A:[1,0], B:[0,1], C:[0.9,0.1]}, prediction [0,1], target B -> rank 0
        let index = index_of(&[("A", vec![1.0, 0.0]), ("B", vec![0.0, 1.0]), ("C", vec![0.9, 0.1])]);
        let provider = MockProvider::new().with_fusion("make it b", vec![0.0, 1.0]);
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::fashion_iq(), settings());

        let report = evaluator
            .evaluate("dress", &[query("A", "B", "make it b", None)], &index)
            .await
            .unwrap();
        assert_eq!(report.recall_at(10), Some(100.0));
        assert_eq!(report.recall_at(50), Some(100.0));
        assert!(report.group_recall.is_none());
        assert_eq!(report.queries, 1);
        assert_eq!(report.index_size, 3);
    }

    #[tokio::test]
    async fn test_cirr_group_scenario() {
        // Prediction [1,0] ranks A, B, C, D, E. Reference A is excluded, leaving
        // B, C, D, E: target D sits at overall position 2 and group {B, C, D} position 2.
        // With group {B, D, E} D sits at group position 1.
        let index = index_of(&[
            ("A", vec![1.0, 0.0]),
            ("B", vec![0.95, 0.3122]),
            ("C", vec![0.8, 0.6]),
            ("D", vec![0.6, 0.8]),
            ("E", vec![0.0, 1.0]),
        ]);
        let provider = MockProvider::new().with_fusion("towards a", vec![1.0, 0.0]);
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::cirr(), settings());
        let queries = vec![
            query("A", "D", "towards a", Some(&["A", "B", "C", "D"])),
            query("A", "D", "towards a", Some(&["A", "B", "D", "E"])),
        ];

        let report = evaluator.evaluate("cirr", &queries, &index).await.unwrap();
        assert_eq!(report.recall_at(1), Some(0.0));
        assert_eq!(report.recall_at(5), Some(100.0));
        assert_eq!(report.group_recall_at(1), Some(0.0));
        assert_eq!(report.group_recall_at(2), Some(50.0));
        assert_eq!(report.group_recall_at(3), Some(100.0));
    }

    #[tokio::test]
    async fn test_group_recall_skips_non_members() {
        // After excluding A the ranking is B, E, D, C: D is at overall position 2
        // and at position 1 among the group {B, C, D}.
        let index = index_of(&[
            ("A", vec![1.0, 0.0]),
            ("B", vec![0.95, 0.3122]),
            ("C", vec![0.0, 1.0]),
            ("D", vec![0.6, 0.8]),
            ("E", vec![0.8, 0.6]),
        ]);
        let provider = MockProvider::new().with_fusion("towards a", vec![1.0, 0.0]);
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::cirr(), settings());
        let queries = vec![query("A", "D", "towards a", Some(&["B", "C", "D"]))];

        let report = evaluator.evaluate("cirr", &queries, &index).await.unwrap();
        assert_eq!(report.recall_at(1), Some(0.0));
        assert_eq!(report.recall_at(5), Some(100.0));
        assert_eq!(report.group_recall_at(1), Some(0.0));
        assert_eq!(report.group_recall_at(2), Some(100.0));
    }

    #[tokio::test]
    async fn test_reference_is_never_retrieved() {
        // The prediction equals the reference, which would otherwise be ranked first
        let index = index_of(&[("A", vec![1.0, 0.0]), ("B", vec![0.9, 0.1]), ("C", vec![0.0, 1.0])]);
        let provider = MockProvider::new();
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::cirr(), settings());
        let queries = vec![query("A", "B", "unchanged", Some(&["A", "B", "C"]))];

        let report = evaluator.evaluate("cirr", &queries, &index).await.unwrap();
        assert_eq!(report.recall_at(1), Some(100.0));
        assert_eq!(report.group_recall_at(1), Some(100.0));
    }

    #[tokio::test]
    async fn test_index_permutation_does_not_change_recall() {
        let entries = vec![
            ("A", vec![1.0, 0.0, 0.0]),
            ("B", vec![0.0, 1.0, 0.0]),
            ("C", vec![0.0, 0.0, 1.0]),
            ("D", vec![0.6, 0.8, 0.0]),
            ("E", vec![0.0, 0.6, 0.8]),
        ];
        let mut permuted = entries.clone();
        permuted.reverse();
        permuted.swap(0, 2);

        let provider = MockProvider::new()
            .with_fusion("t1", vec![0.1, 0.9, 0.2])
            .with_fusion("t2", vec![0.7, 0.2, 0.1])
            .with_fusion("t3", vec![0.0, 0.3, 0.95]);
        let queries = vec![
            query("A", "B", "t1", None),
            query("B", "D", "t2", None),
            query("C", "A", "t3", None),
            query("D", "E", "t3", None),
        ];
        let protocol = EvalProtocol {
            cutoffs: vec![1, 2, 3, 5],
            ..EvalProtocol::fashion_iq()
        };
        let evaluator = MetricsEvaluator::new(&provider, protocol, settings());

        let a = evaluator.evaluate("x", &queries, &index_of(&entries)).await.unwrap();
        let b = evaluator.evaluate("x", &queries, &index_of(&permuted)).await.unwrap();
        assert_eq!(a.recall, b.recall);
    }

    #[tokio::test]
    async fn test_rank_threads_do_not_change_metrics() {
        let index = index_of(&[
            ("A", vec![1.0, 0.0]),
            ("B", vec![0.0, 1.0]),
            ("C", vec![0.7, 0.7]),
            ("D", vec![0.3, 0.9]),
        ]);
        let provider = MockProvider::new();
        let queries: Vec<Query> = ["A", "B", "C", "D", "A", "C"]
            .iter()
            .zip(["C", "D", "A", "B", "D", "B"])
            .map(|(r, t)| query(r, t, "same", None))
            .collect();

        let sequential = MetricsEvaluator::new(&provider, EvalProtocol::fashion_iq(), settings());
        let threaded = MetricsEvaluator::new(
            &provider,
            EvalProtocol::fashion_iq(),
            EvalSettings { rank_threads: 4, ..settings() },
        );
        let a = sequential.evaluate("x", &queries, &index).await.unwrap();
        let b = threaded.evaluate("x", &queries, &index).await.unwrap();
        assert_eq!(a.recall, b.recall);
    }

    #[tokio::test]
    async fn test_missing_group_is_rejected() {
        let index = index_of(&[("A", vec![1.0, 0.0]), ("B", vec![0.0, 1.0])]);
        let provider = MockProvider::new();
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::cirr(), settings());
        let err = evaluator
            .evaluate("cirr", &[query("A", "B", "x", None)], &index)
            .await
            .unwrap_err();
        assert!(matches!(err, CirevalError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unnormalized_index_is_rejected() {
        let index = IndexFeatures::new(
            vec!["A".to_string(), "B".to_string()],
            vec![vec![2.0, 0.0], vec![0.0, 2.0]],
            vec![vec![2.0, 0.0], vec![0.0, 2.0]],
        )
        .unwrap();
        let provider = MockProvider::new();
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::fashion_iq(), settings());
        let err = evaluator
            .evaluate("x", &[query("A", "B", "x", None)], &index)
            .await
            .unwrap_err();
        assert!(matches!(err, CirevalError::InvariantViolation(_)));

        let lenient = MetricsEvaluator::new(
            &provider,
            EvalProtocol::fashion_iq(),
            EvalSettings { verify_unit_norm: false, ..settings() },
        );
        assert!(lenient.evaluate("x", &[query("A", "B", "x", None)], &index).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_queries_are_rejected() {
        let index = index_of(&[("A", vec![1.0, 0.0])]);
        let provider = MockProvider::new();
        let evaluator = MetricsEvaluator::new(&provider, EvalProtocol::fashion_iq(), settings());
        let err = evaluator.evaluate("x", &[], &index).await.unwrap_err();
        assert!(matches!(err, CirevalError::InvalidInput(_)));
    }
}
