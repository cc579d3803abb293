use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::FileId;

pub const DEFAULT_PREDICTION_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub target: FileId,
    pub weight: u64,
}

#[derive(Debug, Default)]
pub struct AccessGraph {
    edges: HashMap<FileId, HashMap<FileId, u64>>,
}

impl AccessGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: &str, target: &str) {
        if source == target {
            return;
        }
        let weight = self
            .edges
            .entry(source.to_string())
            .or_default()
            .entry(target.to_string())
            .or_insert(0);
        *weight += 1;
        tracing::debug!("Edge {} -> {} now weighs {}", source, target, weight);
    }

    pub fn predict(&self, source: &str, limit: usize) -> Vec<Prediction> {
        let Some(targets) = self.edges.get(source) else {
            return Vec::new();
        };

        let mut predictions: Vec<Prediction> = targets
            .iter()
            .map(|(target, weight)| Prediction {
                target: target.clone(),
                weight: *weight,
            })
            .collect();
        // Ties go to the smaller target id.
        predictions.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.target.cmp(&b.target)));
        predictions.truncate(limit);
        predictions
    }

    pub fn decay(&mut self) -> usize {
        let mut removed = 0;
        self.edges.retain(|_, targets| {
            targets.retain(|_, weight| {
                *weight = weight.saturating_sub(1);
                if *weight == 0 {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            !targets.is_empty()
        });
        if removed > 0 {
            tracing::debug!("Decay removed {} edges", removed);
        }
        removed
    }

    pub fn forget(&mut self, file_id: &str) {
        self.edges.remove(file_id);
        self.edges.retain(|_, targets| {
            targets.remove(file_id);
            !targets.is_empty()
        });
    }

    pub fn weight(&self, source: &str, target: &str) -> Option<u64> {
        self.edges.get(source)?.get(target).copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }
}
