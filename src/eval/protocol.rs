use crate::dataset::DatasetKind;
use serde::Serialize;

/// What differs between benchmark protocols; the evaluation pipeline itself is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalProtocol {
    /// Recall@K cutoffs over the full index.
    pub cutoffs: Vec<usize>,
    /// Whether queries carry a closed candidate group.
    pub has_groups: bool,
    /// Recall@K cutoffs within the group.
    pub group_cutoffs: Vec<usize>,
    /// Drop the reference image from its own ranking.
    pub excludes_reference: bool,
}

impl EvalProtocol {
    /// CIRR: Recall@{1,5,10,50}, group Recall@{1,2,3}, reference excluded.
    pub fn cirr() -> Self {
        Self {
            cutoffs: vec![1, 5, 10, 50],
            has_groups: true,
            group_cutoffs: vec![1, 2, 3],
            excludes_reference: true,
        }
    }

    /// FashionIQ: Recall@{10,50}, one ground truth per query.
    pub fn fashion_iq() -> Self {
        Self {
            cutoffs: vec![10, 50],
            has_groups: false,
            group_cutoffs: Vec::new(),
            excludes_reference: false,
        }
    }

    pub fn for_dataset(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Cirr => Self::cirr(),
            DatasetKind::FashionIq => Self::fashion_iq(),
        }
    }
}
