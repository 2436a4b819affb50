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

//! # CineMetric Evaluation Pipeline
//!
//! Drives one evaluation call end to end:
//!
//! ```text
//! EvaluationRequest -> prompt::build -> ModelClient::send
//!                   -> parser::parse -> EvaluationResult
//! ```
//!
//! The orchestrator owns retry and failure classification; the prompt
//! builder is pure; the client adapter is the only component with side
//! effects; the parser tolerates prose around the structured verdicts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cinemetric_core::{Conversation, EvaluationRequest, MetricCatalog, PersonaRegistry, Settings};
//! use cinemetric_evals::{GroqClient, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cinemetric_core::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(PersonaRegistry::builtin()),
//!         Arc::new(MetricCatalog::builtin()),
//!         Arc::new(GroqClient::from_settings(&settings)),
//!     );
//!     let request = EvaluationRequest::new(
//!         Conversation::from_plain_text("User: hello"),
//!         "yoda",
//!         vec!["empathy".into()],
//!     );
//!     let result = orchestrator.evaluate(&request).await?;
//!     println!("{:?}", result.status);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod orchestrator;
pub mod parser;
pub mod prompt;

pub use client::{GroqClient, ModelClient, RawResponse};
pub use orchestrator::Orchestrator;
pub use parser::ParsedOutcome;
pub use prompt::RequestPayload;
