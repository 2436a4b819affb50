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

//! Evaluation orchestrator.
//!
//! One call walks `Building -> Calling -> Parsing` to a terminal outcome.
//! Referential integrity is checked before any network activity; the
//! retry loop is explicit and bounded, with the fatal-vs-retryable branch
//! living in [`EvalError::is_retryable`]; a whole-call malformed response
//! re-enters the Calling stage against the same budget. Success and
//! PartialFailure results are handed to the persistence gateway before
//! being returned. Calls share nothing mutable, so independent
//! evaluations may run concurrently without coordination.

use crate::client::ModelClient;
use crate::parser;
use crate::prompt::{self, RequestPayload};
use cinemetric_core::{
    Conversation, EvalError, EvaluationRequest, EvaluationResult, Metric, MetricCatalog, Persona,
    PersonaRegistry, RetryPolicy,
};
use cinemetric_storage::ResultStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drives the evaluation pipeline against read-only catalogs.
pub struct Orchestrator {
    personas: Arc<PersonaRegistry>,
    metrics: Arc<MetricCatalog>,
    client: Arc<dyn ModelClient>,
    store: Option<Arc<dyn ResultStore>>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        personas: Arc<PersonaRegistry>,
        metrics: Arc<MetricCatalog>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            personas,
            metrics,
            client,
            store: None,
            retry: RetryPolicy::exponential(),
        }
    }

    /// Attach a persistence gateway; results are stored write-after-success.
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Evaluate one request to a terminal outcome.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, EvalError> {
        self.evaluate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Evaluate with caller-initiated cancellation. Cancelling abandons
    /// the outstanding backend call and reports `Cancelled`; nothing is
    /// persisted for a cancelled call.
    pub async fn evaluate_with_cancel(
        &self,
        request: &EvaluationRequest,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, EvalError> {
        // Building: referential integrity before any external call.
        debug!(persona = %request.persona_id, metrics = ?request.metric_ids, "building evaluation");
        let (persona, metrics) = self.resolve(request)?;
        let payload = prompt::build(&request.conversation, &persona, &metrics)?;

        // Calling/Parsing: bounded attempt loop.
        let mut last_error = EvalError::Unknown("no attempt made".into());
        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_for_attempt(attempt - 2);
                debug!(attempt, ?delay, "backing off before retry");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EvalError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            debug!(attempt, model = self.client.model_name(), "calling model backend");
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(EvalError::Cancelled),
                response = self.client.send(&payload) => response,
            };

            let raw = match response {
                Ok(raw) => raw,
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "retry-eligible backend failure");
                    last_error = e;
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!(attempt, "parsing model response");
            match parser::parse(&raw.content, &metrics) {
                Ok(outcome) => {
                    let result = EvaluationResult::from_outcomes(
                        &request.persona_id,
                        &request.metric_ids,
                        outcome.results,
                        outcome.failures,
                        &raw.model,
                        attempt,
                    );
                    self.persist(&result);
                    return Ok(result);
                }
                Err(e @ EvalError::MalformedResponse(_)) => {
                    // Generative output is non-deterministic; re-issue the
                    // call against the same budget.
                    warn!(attempt, error = %e, "whole-call malformed response, re-calling");
                    last_error = e;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(EvalError::BackendUnavailable {
            attempts: self.retry.max_attempts,
            last: last_error.to_string(),
        })
    }

    /// Evaluate the same conversation against several personas, one
    /// independent call each, in the given order. Per-persona outcomes
    /// are reported individually; one persona's failure does not stop
    /// the rest.
    pub async fn evaluate_many(
        &self,
        conversation: &Conversation,
        persona_ids: &[String],
        metric_ids: &[String],
    ) -> Vec<(String, Result<EvaluationResult, EvalError>)> {
        let mut outcomes = Vec::with_capacity(persona_ids.len());
        for persona_id in persona_ids {
            let request = EvaluationRequest::new(
                conversation.clone(),
                persona_id.clone(),
                metric_ids.to_vec(),
            );
            let outcome = self.evaluate(&request).await;
            outcomes.push((persona_id.clone(), outcome));
        }
        outcomes
    }

    fn resolve(
        &self,
        request: &EvaluationRequest,
    ) -> Result<(Arc<Persona>, Vec<Arc<Metric>>), EvalError> {
        if request.metric_ids.is_empty() {
            return Err(EvalError::InvalidInput("no metrics requested".into()));
        }

        let mut seen = HashSet::new();
        for id in &request.metric_ids {
            if !seen.insert(id.as_str()) {
                return Err(EvalError::InvalidInput(format!("duplicate metric id: {id}")));
            }
        }

        let persona = self.personas.get(&request.persona_id).ok_or_else(|| {
            EvalError::InvalidInput(format!("unknown persona id: {}", request.persona_id))
        })?;

        let metrics = request
            .metric_ids
            .iter()
            .map(|id| {
                self.metrics
                    .get(id)
                    .ok_or_else(|| EvalError::InvalidInput(format!("unknown metric id: {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((persona, metrics))
    }

    fn persist(&self, result: &EvaluationResult) {
        if let Some(store) = &self.store {
            if let Err(e) = store.store(result) {
                // The evaluation outcome stands even if the sink is down.
                warn!(result = %result.id, error = %e, "failed to persist evaluation result");
            }
        }
    }
}
