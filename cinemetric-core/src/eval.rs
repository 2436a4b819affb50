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

//! Evaluation request/result contract.
//!
//! One request produces one terminal result. On `Success` the result holds
//! exactly one [`MetricResult`] per requested metric, each within its
//! declared scale; `PartialFailure` carries the successful subset plus a
//! classified per-metric failure for each of the rest. Results are
//! immutable once constructed.

use crate::conversation::Conversation;
use crate::metric::ScoreValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input to one evaluation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub conversation: Conversation,
    pub persona_id: String,
    /// Requested metric ids, non-empty, order-significant: rubrics appear
    /// in the prompt and results are reported in this order.
    pub metric_ids: Vec<String>,
}

impl EvaluationRequest {
    pub fn new(
        conversation: Conversation,
        persona_id: impl Into<String>,
        metric_ids: Vec<String>,
    ) -> Self {
        Self {
            conversation,
            persona_id: persona_id.into(),
            metric_ids,
        }
    }
}

/// A validated per-metric verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_id: String,
    pub score: ScoreValue,
    /// Model-provided justification; may be empty.
    #[serde(default)]
    pub justification: String,
}

/// Why a single metric produced no valid result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricFailure {
    /// The response carried no recoverable entry for this metric.
    MissingField,
    /// A score was recovered but falls outside the declared scale.
    /// The raw value is reported as-is, never clamped.
    OutOfRange { raw: String },
    /// The association between metric and score was ambiguous.
    Malformed { reason: String },
}

impl MetricFailure {
    pub fn describe(&self) -> String {
        match self {
            MetricFailure::MissingField => "no score found in response".to_string(),
            MetricFailure::OutOfRange { raw } => format!("score {raw} outside declared scale"),
            MetricFailure::Malformed { reason } => format!("ambiguous result: {reason}"),
        }
    }
}

/// A metric id paired with its classified failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFailureEntry {
    pub metric_id: String,
    pub failure: MetricFailure,
}

/// Terminal status of an evaluation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    /// Every requested metric produced a valid result.
    Success,
    /// Some metrics validated, some failed; both halves are reported.
    PartialFailure,
    /// No usable result; the error taxonomy explains why.
    Failure,
}

/// Immutable outcome of one evaluation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: Uuid,
    pub persona_id: String,
    /// The metric ids that were requested, in request order.
    pub requested_metrics: Vec<String>,
    /// Valid results, in request order. On `Success` this covers every
    /// requested metric exactly once.
    pub results: Vec<MetricResult>,
    /// Per-metric failures, in request order. Empty on `Success`.
    pub failures: Vec<MetricFailureEntry>,
    pub status: EvalStatus,
    /// Model that produced the verdicts.
    pub model: String,
    /// Total model calls made for this result (1 means no retries).
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// Assemble a terminal result from parsed per-metric outcomes.
    /// Status is derived: failures empty => Success, otherwise
    /// PartialFailure. Whole-call failures never reach this constructor.
    pub fn from_outcomes(
        persona_id: &str,
        requested_metrics: &[String],
        results: Vec<MetricResult>,
        failures: Vec<MetricFailureEntry>,
        model: &str,
        attempts: u32,
    ) -> Self {
        let status = if failures.is_empty() {
            EvalStatus::Success
        } else {
            EvalStatus::PartialFailure
        };
        Self {
            id: Uuid::new_v4(),
            persona_id: persona_id.to_string(),
            requested_metrics: requested_metrics.to_vec(),
            results,
            failures,
            status,
            model: model.to_string(),
            attempts,
            created_at: Utc::now(),
        }
    }

    pub fn result_for(&self, metric_id: &str) -> Option<&MetricResult> {
        self.results.iter().find(|r| r.metric_id == metric_id)
    }
}
