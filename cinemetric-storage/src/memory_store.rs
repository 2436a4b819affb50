// Copyright 2025 CineMetric Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory [`ResultStore`] used by tests and ephemeral runs.

use crate::{ResultFilter, ResultStore, StoreError};
use cinemetric_core::EvaluationResult;
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    results: RwLock<Vec<EvaluationResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

impl ResultStore for MemoryStore {
    fn store(&self, result: &EvaluationResult) -> Result<(), StoreError> {
        self.results.write().push(result.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<EvaluationResult>, StoreError> {
        Ok(self.results.read().iter().find(|r| r.id == id).cloned())
    }

    fn list(&self, filter: &ResultFilter) -> Result<Vec<EvaluationResult>, StoreError> {
        Ok(self
            .results
            .read()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinemetric_core::{MetricResult, ScoreValue};

    #[test]
    fn memory_round_trip() {
        let store = MemoryStore::new();
        let result = EvaluationResult::from_outcomes(
            "yoda",
            &["empathy".to_string()],
            vec![MetricResult {
                metric_id: "empathy".into(),
                score: ScoreValue::Integer(9),
                justification: "strong, the empathy is".into(),
            }],
            vec![],
            "llama-3.1-8b-instant",
            1,
        );
        store.store(&result).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(result.id).unwrap().unwrap(), result);
    }
}
