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

//! Conversation transcripts.
//!
//! A conversation is an ordered sequence of turns supplied per evaluation
//! request. The core never retains it beyond the call. Two input shapes
//! are accepted, matching the original UI: free-form plain text and
//! structured multi-turn input.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Persona,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Persona => write!(f, "Persona"),
        }
    }
}

/// One utterance in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            role: Role::Persona,
            text: text.into(),
        }
    }
}

/// Ordered sequence of turns under evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// Wrap free-form text as a single user turn. Blank input yields an
    /// empty conversation, which the prompt builder rejects.
    pub fn from_plain_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        Self {
            turns: vec![Turn::user(trimmed)],
        }
    }

    /// Parse structured transcript lines of the form `User: ...` /
    /// `Persona: ...`. Lines without a recognized speaker prefix continue
    /// the previous turn; leading unprefixed text becomes a user turn.
    pub fn from_transcript(text: &str) -> Self {
        let mut turns: Vec<Turn> = Vec::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            let parsed = line.split_once(':').and_then(|(speaker, rest)| {
                match speaker.trim().to_ascii_lowercase().as_str() {
                    "user" | "human" | "customer" => Some((Role::User, rest.trim())),
                    "persona" | "assistant" | "agent" | "bot" => Some((Role::Persona, rest.trim())),
                    _ => None,
                }
            });
            match parsed {
                Some((role, text)) => turns.push(Turn {
                    role,
                    text: text.to_string(),
                }),
                None => match turns.last_mut() {
                    Some(last) => {
                        last.text.push('\n');
                        last.text.push_str(line.trim());
                    }
                    None => turns.push(Turn::user(line.trim())),
                },
            }
        }
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() || self.turns.iter().all(|t| t.text.trim().is_empty())
    }

    /// Render the transcript for inclusion in a judge prompt.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
