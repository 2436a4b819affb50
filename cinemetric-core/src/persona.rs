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

//! Persona catalog.
//!
//! A persona is a named behavioral profile (a movie character in the stock
//! catalog) whose prompt template shapes how the judge model evaluates a
//! conversation. Personas are plain records in a keyed registry, loaded
//! once at startup and never mutated afterwards, so concurrent reads need
//! no synchronization.

use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder in a persona prompt template replaced with the metric list.
pub const METRIC_PLACEHOLDER: &str = "{{METRIC}}";
/// Placeholder replaced with the conversation transcript.
pub const CONVERSATION_PLACEHOLDER: &str = "{{CONVERSATION}}";

/// A named behavioral profile used to evaluate conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Stable registry key, e.g. "sherlock-holmes".
    #[serde(alias = "slug")]
    pub id: String,
    /// Display name, e.g. "Sherlock Holmes".
    pub name: String,
    /// Character source and profile shown to users and included in prompts.
    pub description: String,
    /// Behavioral prompt; may contain `{{METRIC}}` and `{{CONVERSATION}}`
    /// placeholders which the prompt builder substitutes.
    pub prompt_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Optional cap on justification length requested from the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reply_chars: Option<usize>,
}

/// JSON import shape: `{ "personas": [ ... ] }`.
#[derive(Debug, Deserialize)]
struct PersonaFile {
    personas: Vec<Persona>,
}

/// Immutable persona registry, keyed by id, insertion-ordered listings.
#[derive(Debug, Default)]
pub struct PersonaRegistry {
    personas: HashMap<String, Arc<Persona>>,
    order: Vec<String>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock movie-character catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(Persona {
            id: "sherlock-holmes".into(),
            name: "Sherlock Holmes".into(),
            description: "The consulting detective from Arthur Conan Doyle's stories: \
                          forensically observant, dispassionate, intolerant of vagueness."
                .into(),
            prompt_template: "You are Sherlock Holmes. Evaluate the conversation below on \
                              {{METRIC}}. Reason from observable evidence in the transcript, \
                              cite the exact lines that support your deduction, and do not \
                              speculate beyond what the text shows.\n\n{{CONVERSATION}}"
                .into(),
            image_url: None,
            max_reply_chars: None,
        });
        registry.insert(Persona {
            id: "mary-poppins".into(),
            name: "Mary Poppins".into(),
            description: "The practically-perfect nanny: firm but kind, attentive to manners \
                          and to how people treat one another."
                .into(),
            prompt_template: "You are Mary Poppins. Evaluate the conversation below on \
                              {{METRIC}}, paying particular attention to courtesy, warmth, \
                              and whether each speaker leaves the other better than they \
                              found them.\n\n{{CONVERSATION}}"
                .into(),
            image_url: None,
            max_reply_chars: None,
        });
        registry.insert(Persona {
            id: "yoda".into(),
            name: "Yoda".into(),
            description: "The Jedi master: patient, terse, focused on intent and balance \
                          rather than surface politeness."
                .into(),
            prompt_template: "Yoda, you are. Judge the conversation below on {{METRIC}}, \
                              you must. To the intent behind each speaker's words, look. \
                              Brief, your justification should be.\n\n{{CONVERSATION}}"
                .into(),
            image_url: None,
            max_reply_chars: Some(600),
        });
        registry
    }

    /// Parse a `personas.json`-style document and merge its entries.
    /// Existing ids are kept; duplicates in the file are skipped with a
    /// warning, matching the original importer's behavior.
    pub fn import_json(&mut self, json: &str) -> Result<usize, EvalError> {
        let file: PersonaFile = serde_json::from_str(json)
            .map_err(|e| EvalError::InvalidInput(format!("persona file: {e}")))?;
        let mut imported = 0;
        for persona in file.personas {
            if self.contains(&persona.id) {
                tracing::warn!(persona = %persona.id, "persona already registered, skipping");
                continue;
            }
            self.insert(persona);
            imported += 1;
        }
        Ok(imported)
    }

    pub fn insert(&mut self, persona: Persona) -> Option<Arc<Persona>> {
        let id = persona.id.clone();
        let prev = self.personas.insert(id.clone(), Arc::new(persona));
        if prev.is_none() {
            self.order.push(id);
        }
        prev
    }

    pub fn get(&self, id: &str) -> Option<Arc<Persona>> {
        self.personas.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.personas.contains_key(id)
    }

    /// All personas in insertion order.
    pub fn all(&self) -> Vec<Arc<Persona>> {
        self.order
            .iter()
            .filter_map(|id| self.personas.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
