//! Ground-truth labels: where the target sits in each ranked list.

use super::rank::RankedResult;
use crate::error::{CirevalError, Result};
use crate::index::IndexFeatures;
use std::collections::HashSet;

/// Boolean match matrix in compact form.
///
/// Each row has exactly one `true` entry (checked at construction), so a row is stored as
/// its match position plus its width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    positions: Vec<usize>,
    widths: Vec<usize>,
}

impl Labels {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Zero-based rank of the target in row `row`.
    pub fn match_position(&self, row: usize) -> usize {
        self.positions[row]
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Row `row` of the boolean match matrix.
    pub fn row(&self, row: usize) -> Vec<bool> {
        let mut out = vec![false; self.widths[row]];
        out[self.positions[row]] = true;
        out
    }
}

fn label_rows<I>(rows: I, targets: &[String], index: &IndexFeatures, what: &str) -> Result<Labels>
where
    I: ExactSizeIterator<Item = Vec<usize>>,
{
    if rows.len() != targets.len() {
        return Err(CirevalError::InvalidInput(format!(
            "{} ranked lists for {} targets",
            rows.len(),
            targets.len()
        )));
    }

    let mut positions = Vec::with_capacity(targets.len());
    let mut widths = Vec::with_capacity(targets.len());
    for (row_no, (row, target)) in rows.zip(targets).enumerate() {
        let target_position = index.position(target);
        let mut matches = row
            .iter()
            .enumerate()
            .filter(|&(_, &p)| Some(p) == target_position)
            .map(|(rank, _)| rank);
        match (matches.next(), matches.next()) {
            (Some(rank), None) => {
                positions.push(rank);
                widths.push(row.len());
            }
            (None, _) => {
                return Err(CirevalError::InvariantViolation(format!(
                    "query {}: target {} not found in {} ranking",
                    row_no, target, what
                )));
            }
            (Some(_), Some(_)) => {
                return Err(CirevalError::InvariantViolation(format!(
                    "query {}: target {} appears more than once in {} ranking",
                    row_no, target, what
                )));
            }
        }
    }
    Ok(Labels { positions, widths })
}

/// Locate every target in its ranked list; exactly one match per row or `InvariantViolation`.
pub fn label(ranked: &[RankedResult], targets: &[String], index: &IndexFeatures) -> Result<Labels> {
    label_rows(ranked.iter().cloned(), targets, index, "full")
}

/// Restrict each ranked list to the query's group members (keeping rank order), then
/// label it with the same exactly-one-match invariant.
pub fn label_groups(
    ranked: &[RankedResult],
    groups: &[Vec<String>],
    targets: &[String],
    index: &IndexFeatures,
) -> Result<Labels> {
    if ranked.len() != groups.len() {
        return Err(CirevalError::InvalidInput(format!(
            "{} ranked lists for {} groups",
            ranked.len(),
            groups.len()
        )));
    }
    let restricted: Vec<RankedResult> = ranked
        .iter()
        .zip(groups)
        .map(|(row, group)| {
            let members: HashSet<usize> = group.iter().filter_map(|m| index.position(m)).collect();
            row.iter().copied().filter(|p| members.contains(p)).collect()
        })
        .collect();
    label_rows(restricted.into_iter(), targets, index, "group")
}
