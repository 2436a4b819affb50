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

//! Process configuration sourced from the environment.
//!
//! Two external secrets exist: the model API credential and the data
//! location. Neither is ever logged or persisted; the `Debug` impl
//! redacts the key.

use crate::error::EvalError;
use crate::retry::RetryPolicy;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the Groq API credential.
pub const API_KEY_VAR: &str = "GROQ_API_KEY";
/// Environment variable holding the result-log directory.
pub const DATA_DIR_VAR: &str = "CINEMETRIC_DATA_DIR";
/// Environment variable overriding the judge model id.
pub const MODEL_VAR: &str = "CINEMETRIC_MODEL";

/// Default judge model, from the reference deployment.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
/// Groq's OpenAI-compatible chat completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
/// Per-call timeout used by the reference deployment.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime settings for the evaluation pipeline.
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    /// Load settings from the process environment. Fails if the API
    /// credential is absent, before any network call can be attempted.
    pub fn from_env() -> Result<Self, EvalError> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                EvalError::Auth(format!("{API_KEY_VAR} environment variable is not set"))
            })?;

        let model = std::env::var(MODEL_VAR)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let data_dir = std::env::var(DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./cinemetric-data"));

        Ok(Self {
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            model,
            data_dir,
            request_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::exponential(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("data_dir", &self.data_dir)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let settings = Settings {
            api_key: "gsk_super_secret".into(),
            api_url: DEFAULT_API_URL.into(),
            model: DEFAULT_MODEL.into(),
            data_dir: PathBuf::from("/tmp/x"),
            request_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::exponential(),
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("gsk_super_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
