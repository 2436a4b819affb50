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

//! Scoring metric definitions.
//!
//! Metrics are plain records in a keyed catalog, loaded once and dispatched
//! by id lookup. Each metric declares its scale and the rubric text that
//! instructs the judge model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared scoring scale for a metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoreScale {
    /// Inclusive integer range, e.g. 0..=10.
    Integer { min: i64, max: i64 },
    /// Fixed category set, e.g. ["poor", "fair", "good"].
    Categorical { categories: Vec<String> },
}

impl ScoreScale {
    /// The 0-10 integer scale used by the default catalog.
    pub fn zero_to_ten() -> Self {
        ScoreScale::Integer { min: 0, max: 10 }
    }

    /// Whether a value satisfies this scale. Category comparison is
    /// case-insensitive; integers must fall inside the inclusive range.
    pub fn contains(&self, value: &ScoreValue) -> bool {
        match (self, value) {
            (ScoreScale::Integer { min, max }, ScoreValue::Integer(v)) => v >= min && v <= max,
            (ScoreScale::Categorical { categories }, ScoreValue::Category(c)) => {
                categories.iter().any(|k| k.eq_ignore_ascii_case(c))
            }
            _ => false,
        }
    }

    /// Human-readable description for prompts and error messages.
    pub fn describe(&self) -> String {
        match self {
            ScoreScale::Integer { min, max } => format!("an integer from {} to {}", min, max),
            ScoreScale::Categorical { categories } => {
                format!("one of: {}", categories.join(", "))
            }
        }
    }
}

/// A score extracted from a model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScoreValue {
    Integer(i64),
    Category(String),
}

impl fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreValue::Integer(v) => write!(f, "{}", v),
            ScoreValue::Category(c) => write!(f, "{}", c),
        }
    }
}

/// One evaluation metric: a named rubric with a declared scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    /// Stable catalog key, e.g. "empathy".
    pub id: String,
    /// Display name, e.g. "Empathy".
    pub name: String,
    pub scale: ScoreScale,
    /// Rubric text placed verbatim in the judge prompt.
    pub rubric: String,
}

impl Metric {
    pub fn integer(id: &str, name: &str, rubric: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            scale: ScoreScale::zero_to_ten(),
            rubric: rubric.to_string(),
        }
    }
}

/// Immutable metric catalog, loaded once at startup.
///
/// Insertion order is preserved so listings are stable across runs.
#[derive(Debug, Default)]
pub struct MetricCatalog {
    metrics: HashMap<String, Arc<Metric>>,
    order: Vec<String>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The suggested metrics from the stock evaluation UI, all on the
    /// 0-10 integer scale.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for metric in [
            Metric::integer(
                "empathy",
                "Empathy",
                "How well does the speaker recognize and respond to the other party's \
                 feelings and perspective?",
            ),
            Metric::integer(
                "clarity",
                "Clarity",
                "Are the messages easy to follow, unambiguous, and well organized?",
            ),
            Metric::integer(
                "helpfulness",
                "Helpfulness",
                "Does the conversation move the other party toward resolving their \
                 question or problem?",
            ),
            Metric::integer(
                "professionalism",
                "Professionalism",
                "Is the tone respectful and appropriate for the context throughout?",
            ),
            Metric::integer(
                "authenticity",
                "Authenticity",
                "Does the speaker come across as genuine rather than scripted or evasive?",
            ),
            Metric::integer(
                "coherence",
                "Coherence",
                "Do the turns connect logically, staying on topic without contradiction?",
            ),
        ] {
            catalog.insert(metric);
        }
        catalog
    }

    /// Insert or replace a metric. Returns the previous entry if any.
    pub fn insert(&mut self, metric: Metric) -> Option<Arc<Metric>> {
        let id = metric.id.clone();
        let prev = self.metrics.insert(id.clone(), Arc::new(metric));
        if prev.is_none() {
            self.order.push(id);
        }
        prev
    }

    pub fn get(&self, id: &str) -> Option<Arc<Metric>> {
        self.metrics.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.metrics.contains_key(id)
    }

    /// All metrics in insertion order.
    pub fn all(&self) -> Vec<Arc<Metric>> {
        self.order
            .iter()
            .filter_map(|id| self.metrics.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
