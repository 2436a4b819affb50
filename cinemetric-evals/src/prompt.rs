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

//! Prompt builder: (conversation, persona, metrics) -> request payload.
//!
//! Pure, no I/O. The system message fixes the structured response
//! convention the parser relies on; the user message carries the persona's
//! behavioral prompt, the rubric block (metrics in request order, matching
//! the order results are expected back), and the transcript.

use cinemetric_core::persona::{CONVERSATION_PLACEHOLDER, METRIC_PLACEHOLDER};
use cinemetric_core::{Conversation, EvalError, Metric, Persona};
use std::fmt::Write as _;
use std::sync::Arc;

/// Fully-specified request for the model backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    pub system: String,
    pub user: String,
}

/// Build the judge request. Fails only on precondition violations
/// (empty conversation, empty metric set); both are checked before any
/// network activity happens downstream.
pub fn build(
    conversation: &Conversation,
    persona: &Persona,
    metrics: &[Arc<Metric>],
) -> Result<RequestPayload, EvalError> {
    if conversation.is_empty() {
        return Err(EvalError::InvalidInput("conversation is empty".into()));
    }
    if metrics.is_empty() {
        return Err(EvalError::InvalidInput("no metrics requested".into()));
    }

    Ok(RequestPayload {
        system: system_message(metrics, persona),
        user: user_message(conversation, persona, metrics),
    })
}

/// The response contract. The backend must emit one entry per metric, in
/// the listed order, so the validator can match by key and sanity-check by
/// position.
fn system_message(metrics: &[Arc<Metric>], persona: &Persona) -> String {
    let mut msg = String::from(
        "You are an expert conversation evaluator with a deep understanding of human \
         interactions and communication patterns. You will adopt the persona described in the \
         user message and evaluate the conversation through that persona's lens.\n\
         IMPORTANT: Respond with ONLY a valid JSON object in this exact format:\n\
         {\"results\": [{\"metric\": \"<metric id>\", \"score\": <value>, \
         \"justification\": \"<text>\"}]}\n\
         Emit exactly one entry per requested metric, in the order the metrics are listed \
         below. Do not include any additional text, preamble, or commentary before or after \
         the JSON object.\n\nRequested metrics and scales:\n",
    );
    for metric in metrics {
        let _ = writeln!(msg, "- \"{}\": score must be {}", metric.id, metric.scale.describe());
    }
    msg.push_str(
        "\nEach justification should cite specific moments from the conversation. \
         Stay true to the persona's unique perspective throughout.",
    );
    if let Some(max) = persona.max_reply_chars {
        let _ = write!(msg, " Keep each justification under {max} characters.");
    }
    msg
}

fn user_message(
    conversation: &Conversation,
    persona: &Persona,
    metrics: &[Arc<Metric>],
) -> String {
    let metric_names = metrics
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let transcript = conversation.transcript();

    let mut body = persona
        .prompt_template
        .replace(METRIC_PLACEHOLDER, &metric_names)
        .replace(CONVERSATION_PLACEHOLDER, &transcript);

    let _ = write!(
        body,
        "\n\nPersona Profile: {}: {}",
        persona.name, persona.description
    );

    body.push_str("\n\nMetrics to score, in order:\n");
    for (i, metric) in metrics.iter().enumerate() {
        let _ = writeln!(
            body,
            "{}. {} (id: {}, {}): {}",
            i + 1,
            metric.name,
            metric.id,
            metric.scale.describe(),
            metric.rubric
        );
    }

    // Templates without the conversation placeholder still need the
    // transcript appended.
    if !persona.prompt_template.contains(CONVERSATION_PLACEHOLDER) {
        let _ = write!(body, "\nConversation to evaluate:\n{transcript}");
    }

    body
}
