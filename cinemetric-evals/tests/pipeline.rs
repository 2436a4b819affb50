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

//! End-to-end pipeline behavior against a scripted backend.

use async_trait::async_trait;
use cinemetric_core::{
    Conversation, EvalError, EvalStatus, EvaluationRequest, MetricCatalog, MetricFailure,
    PersonaRegistry, RetryPolicy, ScoreValue,
};
use cinemetric_evals::{ModelClient, Orchestrator, RawResponse, RequestPayload};
use cinemetric_storage::{MemoryStore, ResultFilter, ResultStore};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct ScriptedClient {
    script: Mutex<VecDeque<Result<RawResponse, EvalError>>>,
    calls: Mutex<u32>,
}

impl ScriptedClient {
    fn new(script: Vec<Result<RawResponse, EvalError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn send(&self, _payload: &RequestPayload) -> Result<RawResponse, EvalError> {
        *self.calls.lock() += 1;
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(EvalError::Unknown("script exhausted".into())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Backend that never responds until cancelled.
struct HangingClient;

#[async_trait]
impl ModelClient for HangingClient {
    async fn send(&self, _payload: &RequestPayload) -> Result<RawResponse, EvalError> {
        futures_never().await
    }

    fn model_name(&self) -> &str {
        "hanging"
    }
}

async fn futures_never() -> Result<RawResponse, EvalError> {
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    }
}

fn ok(content: &str) -> Result<RawResponse, EvalError> {
    Ok(RawResponse {
        content: content.to_string(),
        model: "scripted".into(),
    })
}

fn orchestrator(client: Arc<dyn ModelClient>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(PersonaRegistry::builtin()),
        Arc::new(MetricCatalog::builtin()),
        client,
    )
    .with_retry(RetryPolicy::immediate(3))
}

fn request(metric_ids: &[&str]) -> EvaluationRequest {
    EvaluationRequest::new(
        Conversation::from_transcript("User: my package is lost\nPersona: I will track it down"),
        "sherlock-holmes",
        metric_ids.iter().map(|s| s.to_string()).collect(),
    )
}

const THREE_METRIC_VERDICT: &str = r#"{"results": [
    {"metric": "empathy", "score": 7, "justification": "acknowledges the loss"},
    {"metric": "clarity", "score": 9, "justification": "direct and precise"},
    {"metric": "coherence", "score": 8, "justification": "logically ordered"}
]}"#;

#[tokio::test]
async fn success_has_one_in_scale_result_per_requested_metric() {
    let client = Arc::new(ScriptedClient::new(vec![ok(THREE_METRIC_VERDICT)]));
    let orch = orchestrator(client.clone());
    let req = request(&["empathy", "clarity", "coherence"]);

    let result = orch.evaluate(&req).await.unwrap();
    assert_eq!(result.status, EvalStatus::Success);
    assert_eq!(result.results.len(), 3);
    assert!(result.failures.is_empty());
    assert_eq!(result.attempts, 1);

    let catalog = MetricCatalog::builtin();
    for (i, metric_id) in req.metric_ids.iter().enumerate() {
        let metric_result = &result.results[i];
        assert_eq!(&metric_result.metric_id, metric_id);
        let scale = &catalog.get(metric_id).unwrap().scale;
        assert!(scale.contains(&metric_result.score));
    }
}

#[tokio::test]
async fn rate_limited_twice_then_success_retries_within_budget() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(EvalError::RateLimited),
        Err(EvalError::RateLimited),
        ok(THREE_METRIC_VERDICT),
    ]));
    let orch = orchestrator(client.clone());

    let result = orch
        .evaluate(&request(&["empathy", "clarity", "coherence"]))
        .await
        .unwrap();
    assert_eq!(result.status, EvalStatus::Success);
    assert_eq!(result.attempts, 3); // two retries observed
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn auth_error_is_fatal_after_exactly_one_call() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(EvalError::Auth("invalid api key".into())),
        ok(THREE_METRIC_VERDICT), // must never be reached
    ]));
    let orch = orchestrator(client.clone());

    let err = orch.evaluate(&request(&["empathy"])).await.unwrap_err();
    assert!(matches!(err, EvalError::Auth(_)));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn exhausted_budget_surfaces_backend_unavailable() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(EvalError::RateLimited),
        Err(EvalError::TransientServer("503".into())),
        Err(EvalError::RateLimited),
    ]));
    let orch = orchestrator(client.clone());

    let err = orch.evaluate(&request(&["empathy"])).await.unwrap_err();
    match err {
        EvalError::BackendUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected BackendUnavailable, got {other:?}"),
    }
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn one_missing_metric_yields_partial_failure() {
    let partial = r#"{"results": [
        {"metric": "empathy", "score": 7, "justification": "x"},
        {"metric": "clarity", "score": 9, "justification": "y"}
    ]}"#;
    let client = Arc::new(ScriptedClient::new(vec![ok(partial)]));
    let orch = orchestrator(client.clone());

    let result = orch
        .evaluate(&request(&["empathy", "clarity", "coherence"]))
        .await
        .unwrap();
    assert_eq!(result.status, EvalStatus::PartialFailure);
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].metric_id, "coherence");
    assert_eq!(result.failures[0].failure, MetricFailure::MissingField);
    // One clean call; a partial result is terminal, never retried.
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn all_metrics_missing_consumes_a_retry_then_recovers() {
    let unrelated = r#"{"results": [{"metric": "sparkle", "score": 3, "justification": "?"}]}"#;
    let client = Arc::new(ScriptedClient::new(vec![
        ok(unrelated),
        ok(THREE_METRIC_VERDICT),
    ]));
    let orch = orchestrator(client.clone());

    let result = orch
        .evaluate(&request(&["empathy", "clarity", "coherence"]))
        .await
        .unwrap();
    assert_eq!(result.status, EvalStatus::Success);
    assert_eq!(result.attempts, 2); // malformed response consumed one attempt
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn persistent_malformed_output_exhausts_the_budget() {
    let client = Arc::new(ScriptedClient::new(vec![
        ok("gibberish"),
        ok("more gibberish"),
        ok("still gibberish"),
    ]));
    let orch = orchestrator(client.clone());

    let err = orch.evaluate(&request(&["empathy"])).await.unwrap_err();
    assert!(matches!(err, EvalError::BackendUnavailable { .. }));
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn out_of_range_score_is_surfaced_raw() {
    let verdict = r#"{"results": [
        {"metric": "empathy", "score": 11, "justification": "beyond measure"},
        {"metric": "clarity", "score": 9, "justification": "fine"}
    ]}"#;
    let client = Arc::new(ScriptedClient::new(vec![ok(verdict)]));
    let orch = orchestrator(client);

    let result = orch.evaluate(&request(&["empathy", "clarity"])).await.unwrap();
    assert_eq!(result.status, EvalStatus::PartialFailure);
    assert_eq!(
        result.failures[0].failure,
        MetricFailure::OutOfRange { raw: "11".into() }
    );
    assert_eq!(result.results[0].score, ScoreValue::Integer(9));
}

#[tokio::test]
async fn successful_result_is_written_to_the_store() {
    let client = Arc::new(ScriptedClient::new(vec![ok(THREE_METRIC_VERDICT)]));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(client).with_store(store.clone());

    let result = orch
        .evaluate(&request(&["empathy", "clarity", "coherence"]))
        .await
        .unwrap();

    let stored = store.get(result.id).unwrap().unwrap();
    assert_eq!(stored, result);
    assert_eq!(store.list(&ResultFilter::default()).unwrap().len(), 1);
}

#[tokio::test]
async fn failed_evaluation_stores_nothing() {
    let client = Arc::new(ScriptedClient::new(vec![Err(EvalError::Auth("no".into()))]));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(client).with_store(store.clone());

    let _ = orch.evaluate(&request(&["empathy"])).await.unwrap_err();
    assert!(store.is_empty());
}

#[tokio::test]
async fn cancellation_reports_cancelled_and_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(Arc::new(HangingClient)).with_store(store.clone());
    let cancel = CancellationToken::new();

    let req = request(&["empathy"]);
    let pending = orch.evaluate_with_cancel(&req, &cancel);
    cancel.cancel();

    let err = pending.await.unwrap_err();
    assert_eq!(err, EvalError::Cancelled);
    assert!(store.is_empty());
}

#[tokio::test]
async fn evaluate_many_produces_one_outcome_per_persona() {
    let client = Arc::new(ScriptedClient::new(vec![
        ok(THREE_METRIC_VERDICT),
        Err(EvalError::Auth("no".into())),
    ]));
    let orch = orchestrator(client);

    let conversation = Conversation::from_plain_text("User: hello");
    let personas = vec!["sherlock-holmes".to_string(), "yoda".to_string()];
    let metrics = vec![
        "empathy".to_string(),
        "clarity".to_string(),
        "coherence".to_string(),
    ];

    let outcomes = orch.evaluate_many(&conversation, &personas, &metrics).await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, "sherlock-holmes");
    assert!(outcomes[0].1.is_ok());
    assert!(matches!(outcomes[1].1, Err(EvalError::Auth(_))));
}
