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

//! Model client adapter.
//!
//! The single translation boundary to the hosted backend: one outbound
//! HTTP call per `send`, failures classified into the evaluation error
//! taxonomy, no retry here (the orchestrator owns the budget), no shared
//! mutable state — safe to invoke concurrently for independent requests.

use crate::prompt::RequestPayload;
use async_trait::async_trait;
use cinemetric_core::{EvalError, Settings};
use std::time::Duration;

/// Raw completion text from the backend.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub content: String,
    /// Model that served the request, as reported by the backend.
    pub model: String,
}

/// Abstraction over the model backend, object-safe for test doubles.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one judge request. Exactly one outbound call per invocation.
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, EvalError>;

    fn model_name(&self) -> &str;
}

/// Client for Groq's OpenAI-compatible chat completions API.
pub struct GroqClient {
    api_key: String,
    model: String,
    api_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GroqClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_url: cinemetric_core::config::DEFAULT_API_URL.to_string(),
            timeout: cinemetric_core::config::DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            api_url: settings.api_url.clone(),
            timeout: settings.request_timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ModelClient for GroqClient {
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, EvalError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": payload.system },
                { "role": "user", "content": payload.user }
            ],
            "max_tokens": 1024,
            "temperature": 0.1,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EvalError::Timeout(self.timeout)
                } else if e.is_connect() {
                    EvalError::TransientServer(format!("connection failed: {e}"))
                } else {
                    EvalError::Unknown(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EvalError::MalformedResponse(format!("backend envelope: {e}")))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                EvalError::MalformedResponse("completion content missing from envelope".into())
            })?
            .trim()
            .to_string();

        let model = data["model"].as_str().unwrap_or(&self.model).to_string();

        Ok(RawResponse { content, model })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: reqwest::StatusCode, detail: &str) -> EvalError {
    // The detail text may echo request content but never our credential.
    let detail = truncate(detail, 300);
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            EvalError::Auth(format!("{status}: {detail}"))
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => EvalError::RateLimited,
        s if s.is_server_error() => EvalError::TransientServer(format!("{status}: {detail}")),
        _ => EvalError::Unknown(format!("{status}: {detail}")),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RequestPayload {
        RequestPayload {
            system: "You are an evaluator.".into(),
            user: "Judge this.".into(),
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> GroqClient {
        GroqClient::new("test-key".into(), "llama-3.1-8b-instant".into())
            .with_api_url(server.url())
            .with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn success_extracts_completion_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{
                    "model": "llama-3.1-8b-instant",
                    "choices": [{"message": {"content": "{\"results\": []}"}}]
                }"#,
            )
            .create_async()
            .await;

        let response = client_for(&server).send(&payload()).await.unwrap();
        assert_eq!(response.content, r#"{"results": []}"#);
        assert_eq!(response.model, "llama-3.1-8b-instant");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = client_for(&server).send(&payload()).await.unwrap_err();
        assert_eq!(err, EvalError::RateLimited);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let err = client_for(&server).send(&payload()).await.unwrap_err();
        assert!(matches!(err, EvalError::Auth(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = client_for(&server).send(&payload()).await.unwrap_err();
        assert!(matches!(err, EvalError::TransientServer(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unexpected_status_is_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(404)
            .create_async()
            .await;

        let err = client_for(&server).send(&payload()).await.unwrap_err();
        assert!(matches!(err, EvalError::Unknown(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client_for(&server).send(&payload()).await.unwrap_err();
        assert!(matches!(err, EvalError::MalformedResponse(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let cut = truncate(text, 3);
        assert!(cut.starts_with("h"));
        assert!(cut.ends_with("..."));
    }
}
