//! Metrics reports and their labeled-scalar rendering.

use super::metrics::mean;
use crate::dataset::DatasetKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Metrics of one evaluated split (one FashionIQ category, or CIRR).
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    /// "cirr", or the FashionIQ category.
    pub label: String,
    pub queries: usize,
    pub index_size: usize,
    pub recall: BTreeMap<usize, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_recall: Option<BTreeMap<usize, f64>>,
}

impl MetricsReport {
    pub fn recall_at(&self, k: usize) -> Option<f64> {
        self.recall.get(&k).copied()
    }

    pub fn group_recall_at(&self, k: usize) -> Option<f64> {
        self.group_recall.as_ref().and_then(|g| g.get(&k).copied())
    }

    /// `(name, value)` pairs: group recalls first, then recalls, optionally prefixed.
    pub fn scalars(&self, prefix: Option<&str>) -> Vec<(String, f64)> {
        let prefix = prefix.map(|p| format!("{}_", p)).unwrap_or_default();
        let mut out = Vec::new();
        if let Some(group) = &self.group_recall {
            for (k, v) in group {
                out.push((format!("{}group_recall_at{}", prefix, k), *v));
            }
        }
        for (k, v) in &self.recall {
            out.push((format!("{}recall_at{}", prefix, k), *v));
        }
        out
    }
}

/// Everything one CLI invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dataset: DatasetKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reports: Vec<MetricsReport>,
    /// Mean recall across reports, keyed by cutoff (FashionIQ categories).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub average_recall: BTreeMap<usize, f64>,
}

impl RunReport {
    pub fn new(dataset: DatasetKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dataset,
            started_at: Utc::now(),
            finished_at: None,
            reports: Vec::new(),
            average_recall: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, report: MetricsReport) {
        self.reports.push(report);
    }

    /// Stamp the finish time and compute averages over cutoffs shared by every report.
    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self.average_recall.clear();
        if self.reports.len() > 1 {
            if let Some(first) = self.reports.first() {
                for &k in first.recall.keys() {
                    let values: Option<Vec<f64>> =
                        self.reports.iter().map(|r| r.recall_at(k)).collect();
                    if let Some(values) = values {
                        self.average_recall.insert(k, mean(&values));
                    }
                }
            }
        }
        self
    }

    pub fn report(&self, label: &str) -> Option<&MetricsReport> {
        self.reports.iter().find(|r| r.label == label)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    /// One `name = value` line per scalar; split reports are prefixed with their label
    /// when there are several.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixed = self.reports.len() > 1;
        for (i, report) in self.reports.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let prefix = prefixed.then_some(report.label.as_str());
            for (name, value) in report.scalars(prefix) {
                writeln!(f, "{} = {}", name, value)?;
            }
        }
        if !self.average_recall.is_empty() {
            writeln!(f)?;
            for (k, v) in &self.average_recall {
                writeln!(f, "average_recall_at{} = {}", k, v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(label: &str, r10: f64, r50: f64) -> MetricsReport {
        MetricsReport {
            label: label.to_string(),
            queries: 4,
            index_size: 10,
            recall: BTreeMap::from([(10, r10), (50, r50)]),
            group_recall: None,
        }
    }

    #[test]
    fn averages_over_categories() {
        let mut run = RunReport::new(DatasetKind::FashionIq);
        run.push(report("shirt", 10.0, 40.0));
        run.push(report("dress", 20.0, 50.0));
        run.push(report("toptee", 30.0, 60.0));
        let run = run.finish();

        assert!(run.finished_at.is_some());
        assert!((run.average_recall[&10] - 20.0).abs() < 1e-9);
        assert!((run.average_recall[&50] - 50.0).abs() < 1e-9);
        assert_eq!(run.report("dress").unwrap().recall_at(10), Some(20.0));
    }

    #[test]
    fn single_report_has_no_average() {
        let mut run = RunReport::new(DatasetKind::Cirr);
        run.push(MetricsReport {
            label: "cirr".to_string(),
            queries: 2,
            index_size: 5,
            recall: BTreeMap::from([(1, 50.0)]),
            group_recall: Some(BTreeMap::from([(1, 100.0)])),
        });
        let run = run.finish();
        assert!(run.average_recall.is_empty());

        let text = run.to_string();
        assert_eq!(text, "group_recall_at1 = 100\nrecall_at1 = 50\n");
    }

    #[test]
    fn display_prefixes_categories() {
        let mut run = RunReport::new(DatasetKind::FashionIq);
        run.push(report("shirt", 12.5, 40.0));
        run.push(report("dress", 20.0, 50.0));
        let text = run.finish().to_string();
        assert!(text.contains("shirt_recall_at10 = 12.5"));
        assert!(text.contains("dress_recall_at50 = 50"));
        assert!(text.contains("average_recall_at10 = 16.25"));
    }

    #[test]
    fn json_contains_run_metadata() {
        let mut run = RunReport::new(DatasetKind::FashionIq);
        run.push(report("shirt", 10.0, 40.0));
        let json: serde_json::Value = serde_json::from_str(&run.finish().to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["dataset"], "fiq");
        assert_eq!(json["reports"][0]["recall"]["10"], 10.0);
        assert!(json["run_id"].is_string());
        assert!(json.get("average_recall").is_none());
    }
}
