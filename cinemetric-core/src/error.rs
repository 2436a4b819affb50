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

//! Error taxonomy for evaluation calls.
//!
//! Every failure is an explicit value returned to the caller. The
//! orchestrator is the single place that decides retry vs. surface, and it
//! does so through [`EvalError::is_retryable`] — an explicit, testable
//! branch rather than a retry decorator.

use std::time::Duration;
use thiserror::Error;

/// Classified failures for one evaluation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// Bad request shape (empty conversation, unknown persona/metric id).
    /// Surfaced immediately, never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Credential rejected by the backend. Will not self-resolve; requires
    /// operator intervention. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The backend call exceeded its per-call deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend throttled us (HTTP 429).
    #[error("rate limited by model backend")]
    RateLimited,

    /// Transient 5xx-class backend failure.
    #[error("transient server error: {0}")]
    TransientServer(String),

    /// Retry budget exhausted on retry-eligible failures.
    #[error("backend unavailable after {attempts} attempts (last error: {last}); retry later")]
    BackendUnavailable { attempts: u32, last: String },

    /// The model output could not be associated with any requested metric.
    /// Generative output is non-deterministic, so this is retry-eligible.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// Caller abandoned the in-flight evaluation. Nothing is persisted.
    #[error("evaluation cancelled by caller")]
    Cancelled,

    /// Anything the adapter could not classify. Not retried.
    #[error("unclassified backend error: {0}")]
    Unknown(String),
}

impl EvalError {
    /// Whether the orchestrator may re-issue the model call for this
    /// failure within the attempt budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvalError::Timeout(_)
                | EvalError::RateLimited
                | EvalError::TransientServer(_)
                | EvalError::MalformedResponse(_)
        )
    }

    /// Short stable tag for logs and machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::InvalidInput(_) => "invalid_input",
            EvalError::Auth(_) => "auth_error",
            EvalError::Timeout(_) => "timeout",
            EvalError::RateLimited => "rate_limited",
            EvalError::TransientServer(_) => "transient_server_error",
            EvalError::BackendUnavailable { .. } => "backend_unavailable",
            EvalError::MalformedResponse(_) => "malformed_response",
            EvalError::Cancelled => "cancelled",
            EvalError::Unknown(_) => "unknown",
        }
    }
}
