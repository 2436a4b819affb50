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

//! CineMetric Core
//!
//! Fundamental data structures for persona-based conversation evaluation:
//! the persona and metric catalogs, conversation transcripts, the
//! request/result contract, the error taxonomy, and the retry policy.

pub mod config;
pub mod conversation;
pub mod error;
pub mod eval;
pub mod metric;
pub mod persona;
pub mod retry;

pub use config::Settings;
pub use conversation::{Conversation, Role, Turn};
pub use error::EvalError;
pub use eval::{
    EvalStatus, EvaluationRequest, EvaluationResult, MetricFailure, MetricFailureEntry,
    MetricResult,
};
pub use metric::{Metric, MetricCatalog, ScoreScale, ScoreValue};
pub use persona::{Persona, PersonaRegistry};
pub use retry::RetryPolicy;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, EvalError>;
