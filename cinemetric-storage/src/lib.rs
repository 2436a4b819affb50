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

//! CineMetric Storage
//!
//! Persistence gateway for evaluation results. The orchestrator treats
//! this as a pure write-after-success sink; the storage format (an
//! append-only log with CRC framing) is an implementation detail behind
//! the [`ResultStore`] trait.

mod memory_store;
mod result_log;

pub use memory_store::MemoryStore;
pub use result_log::ResultLog;

use chrono::{DateTime, Utc};
use cinemetric_core::EvaluationResult;
use thiserror::Error;
use uuid::Uuid;

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Query filters for [`ResultStore::list`]. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub persona_id: Option<String>,
    /// Matches results whose requested metrics include this id.
    pub metric_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ResultFilter {
    pub fn matches(&self, result: &EvaluationResult) -> bool {
        if let Some(persona) = &self.persona_id {
            if &result.persona_id != persona {
                return false;
            }
        }
        if let Some(metric) = &self.metric_id {
            if !result.requested_metrics.iter().any(|m| m == metric) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if result.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if result.created_at > until {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over stored results.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub total_results: usize,
    pub successes: usize,
    pub partial_failures: usize,
    pub total_metric_scores: usize,
}

/// Persistence gateway contract.
///
/// Implementations must be safe for concurrent use; the evaluation
/// pipeline may store results from independent calls in parallel.
pub trait ResultStore: Send + Sync {
    fn store(&self, result: &EvaluationResult) -> Result<(), StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<EvaluationResult>, StoreError>;

    /// Results matching the filter, oldest first.
    fn list(&self, filter: &ResultFilter) -> Result<Vec<EvaluationResult>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let results = self.list(&ResultFilter::default())?;
        let mut stats = StoreStats {
            total_results: results.len(),
            ..Default::default()
        };
        for result in &results {
            match result.status {
                cinemetric_core::EvalStatus::Success => stats.successes += 1,
                cinemetric_core::EvalStatus::PartialFailure => stats.partial_failures += 1,
                cinemetric_core::EvalStatus::Failure => {}
            }
            stats.total_metric_scores += result.results.len();
        }
        Ok(stats)
    }
}
