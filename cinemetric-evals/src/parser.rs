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

//! Response parser/validator.
//!
//! Model output is natural-language-adjacent, so extraction runs a fixed
//! priority ladder of rules, each returning a typed outcome:
//!
//! 1. the whole body parses as the documented JSON contract;
//! 2. a JSON object embedded in surrounding prose (first `{` to last `}`);
//! 3. a line-oriented `metric: score` pattern scan.
//!
//! Validation is per metric: a missing metric is that metric's failure,
//! not the call's — unless every requested metric is missing, which is a
//! whole-call `MalformedResponse` (and retry-eligible upstream). Scores
//! outside the declared scale are reported raw, never clamped or guessed.
//! Extra metrics in the response are ignored.

use cinemetric_core::{
    EvalError, Metric, MetricFailure, MetricFailureEntry, MetricResult, ScoreScale, ScoreValue,
};
use regex::Regex;
use std::sync::Arc;

/// Per-metric outcomes recovered from one raw response.
#[derive(Debug, Clone, Default)]
pub struct ParsedOutcome {
    /// Valid results, in request order.
    pub results: Vec<MetricResult>,
    /// Classified per-metric failures, in request order.
    pub failures: Vec<MetricFailureEntry>,
}

/// One candidate verdict recovered by an extraction rule, before
/// validation against the metric's declared scale.
#[derive(Debug, Clone)]
struct RawEntry {
    metric_key: String,
    score: serde_json::Value,
    justification: String,
}

/// Parse a raw completion against the expected metric set.
pub fn parse(raw: &str, expected: &[Arc<Metric>]) -> Result<ParsedOutcome, EvalError> {
    let entries = extract_document(raw, expected)
        .or_else(|| extract_embedded(raw, expected))
        .or_else(|| extract_lines(raw, expected))
        .ok_or_else(|| {
            EvalError::MalformedResponse("no recognizable verdicts in model output".into())
        })?;

    validate(&entries, expected)
}

/// Rule 1: the whole body is the documented JSON object.
fn extract_document(raw: &str, expected: &[Arc<Metric>]) -> Option<Vec<RawEntry>> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    entries_from_value(&value, expected)
}

/// Rule 2: a JSON object surrounded by prose. Mirrors the reference
/// implementation's first-`{`-to-last-`}` extraction.
fn extract_embedded(raw: &str, expected: &[Arc<Metric>]) -> Option<Vec<RawEntry>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&raw[start..=end]).ok()?;
    entries_from_value(&value, expected)
}

/// Rule 3: line-oriented `metric ... <number>` scan. Only integers are
/// recoverable this way; a metric matched by several conflicting lines is
/// ambiguous and dropped here so validation reports it as malformed.
fn extract_lines(raw: &str, expected: &[Arc<Metric>]) -> Option<Vec<RawEntry>> {
    let mut entries = Vec::new();
    for metric in expected {
        let pattern = format!(
            r"(?im)^.*?\b(?:{}|{})\b[^\w\d-]{{0,20}}(-?\d+(?:\.\d+)?)\b(.*)$",
            regex::escape(&metric.id),
            regex::escape(&metric.name),
        );
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(_) => continue,
        };

        let mut scores: Vec<(String, String)> = Vec::new();
        for caps in re.captures_iter(raw) {
            let score = caps[1].to_string();
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let justification = rest
                .trim_start_matches(['-', ':', ',', '.', ')', ' '])
                .trim()
                .to_string();
            scores.push((score, justification));
        }
        scores.dedup_by(|a, b| a.0 == b.0);

        match scores.len() {
            0 => {}
            1 => {
                let (score, justification) = scores.remove(0);
                let score_value = score
                    .parse::<i64>()
                    .map(serde_json::Value::from)
                    .unwrap_or_else(|_| serde_json::Value::from(score.clone()));
                entries.push(RawEntry {
                    metric_key: metric.id.clone(),
                    score: score_value,
                    justification,
                });
            }
            _ => {
                // Conflicting scores on separate lines: ambiguous
                // association, surfaced per-metric by validate().
                entries.push(RawEntry {
                    metric_key: metric.id.clone(),
                    score: serde_json::Value::Null,
                    justification: format!("{} conflicting scores in output", scores.len()),
                });
            }
        }
    }
    if entries.is_empty() {
        None
    } else {
        Some(entries)
    }
}

/// Normalize a parsed JSON document into candidate entries. Accepts the
/// documented `{"results": [...]}` contract, a bare metric->verdict map,
/// and the legacy single-metric `{"score": ..., "explanation": ...}`
/// shape. Returns None when the document carries no verdicts at all.
fn entries_from_value(
    value: &serde_json::Value,
    expected: &[Arc<Metric>],
) -> Option<Vec<RawEntry>> {
    let mut entries = Vec::new();

    if let Some(results) = value.get("results").and_then(|r| r.as_array()) {
        for (index, item) in results.iter().enumerate() {
            let key = item
                .get("metric")
                .or_else(|| item.get("criterion"))
                .or_else(|| item.get("name"))
                .and_then(|k| k.as_str())
                .map(str::to_string)
                // No key: fall back to positional association, valid only
                // when the response has one entry per requested metric.
                .or_else(|| {
                    (results.len() == expected.len()).then(|| expected[index].id.clone())
                });
            let Some(key) = key else { continue };

            entries.push(RawEntry {
                metric_key: key,
                score: item.get("score").cloned().unwrap_or(serde_json::Value::Null),
                justification: justification_of(item),
            });
        }
    } else if let Some(object) = value.as_object() {
        if object.contains_key("score") && expected.len() == 1 {
            // Legacy single-metric shape.
            entries.push(RawEntry {
                metric_key: expected[0].id.clone(),
                score: object.get("score").cloned().unwrap_or(serde_json::Value::Null),
                justification: justification_of(value),
            });
        } else {
            // Bare map of metric -> number | { score, justification }.
            for (key, item) in object {
                let (score, justification) = match item {
                    serde_json::Value::Object(_) => (
                        item.get("score").cloned().unwrap_or(serde_json::Value::Null),
                        justification_of(item),
                    ),
                    _ => (item.clone(), String::new()),
                };
                entries.push(RawEntry {
                    metric_key: key.clone(),
                    score,
                    justification,
                });
            }
        }
    }

    if entries.is_empty() {
        None
    } else {
        Some(entries)
    }
}

fn justification_of(item: &serde_json::Value) -> String {
    item.get("justification")
        .or_else(|| item.get("explanation"))
        .or_else(|| item.get("reasoning"))
        .and_then(|j| j.as_str())
        .unwrap_or("")
        .to_string()
}

/// Validate candidate entries against the expected metrics, in request
/// order. Key matching is case-insensitive on metric id and display name.
fn validate(entries: &[RawEntry], expected: &[Arc<Metric>]) -> Result<ParsedOutcome, EvalError> {
    let mut outcome = ParsedOutcome::default();
    let mut any_associated = false;

    for metric in expected {
        let matches: Vec<&RawEntry> = entries
            .iter()
            .filter(|e| {
                let key = e.metric_key.trim();
                key.eq_ignore_ascii_case(&metric.id) || key.eq_ignore_ascii_case(&metric.name)
            })
            .collect();

        match matches.as_slice() {
            [] => outcome.failures.push(MetricFailureEntry {
                metric_id: metric.id.clone(),
                failure: MetricFailure::MissingField,
            }),
            [entry] => {
                any_associated = true;
                outcome.push_validated(metric, entry);
            }
            many => {
                any_associated = true;
                let first = &many[0].score;
                if many.iter().all(|e| &e.score == first) {
                    outcome.push_validated(metric, many[0]);
                } else {
                    outcome.failures.push(MetricFailureEntry {
                        metric_id: metric.id.clone(),
                        failure: MetricFailure::Malformed {
                            reason: format!("{} conflicting entries for this metric", many.len()),
                        },
                    });
                }
            }
        }
    }

    if !any_associated {
        return Err(EvalError::MalformedResponse(
            "response contained none of the requested metrics".into(),
        ));
    }

    Ok(outcome)
}

impl ParsedOutcome {
    fn push_validated(&mut self, metric: &Metric, entry: &RawEntry) {
        match coerce_score(&entry.score, &metric.scale) {
            Coerced::Valid(score) => self.results.push(MetricResult {
                metric_id: metric.id.clone(),
                score,
                justification: entry.justification.clone(),
            }),
            Coerced::OutOfRange(raw) => self.failures.push(MetricFailureEntry {
                metric_id: metric.id.clone(),
                failure: MetricFailure::OutOfRange { raw },
            }),
            Coerced::Missing => self.failures.push(MetricFailureEntry {
                metric_id: metric.id.clone(),
                failure: if entry.justification.is_empty() {
                    MetricFailure::MissingField
                } else {
                    MetricFailure::Malformed {
                        reason: entry.justification.clone(),
                    }
                },
            }),
        }
    }
}

enum Coerced {
    Valid(ScoreValue),
    OutOfRange(String),
    Missing,
}

/// Coerce a JSON score into the metric's scale. Integers may arrive as
/// numbers or numeric strings; categorical values as strings. Anything
/// recoverable but outside the scale is reported raw — never clamped.
fn coerce_score(score: &serde_json::Value, scale: &ScoreScale) -> Coerced {
    let candidate = match score {
        serde_json::Value::Null => return Coerced::Missing,
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScoreValue::Integer(i)
            } else {
                // Fractional score against any declared scale.
                return Coerced::OutOfRange(n.to_string());
            }
        }
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coerced::Missing;
            }
            match trimmed.parse::<i64>() {
                Ok(i) => ScoreValue::Integer(i),
                Err(_) => ScoreValue::Category(trimmed.to_string()),
            }
        }
        other => return Coerced::OutOfRange(other.to_string()),
    };

    if scale.contains(&candidate) {
        Coerced::Valid(candidate)
    } else {
        Coerced::OutOfRange(candidate.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinemetric_core::MetricCatalog;

    fn metrics(ids: &[&str]) -> Vec<Arc<Metric>> {
        let catalog = MetricCatalog::builtin();
        ids.iter().map(|id| catalog.get(id).unwrap()).collect()
    }

    #[test]
    fn strict_json_contract_parses() {
        let raw = r#"{"results": [
            {"metric": "empathy", "score": 8, "justification": "warm throughout"},
            {"metric": "clarity", "score": 6, "justification": "some jargon"}
        ]}"#;
        let outcome = parse(raw, &metrics(&["empathy", "clarity"])).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.results[0].metric_id, "empathy");
        assert_eq!(outcome.results[0].score, ScoreValue::Integer(8));
        assert_eq!(outcome.results[1].justification, "some jargon");
    }

    #[test]
    fn embedded_json_with_prose_parses() {
        let raw = "Certainly! Here is my evaluation:\n\
                   {\"results\": [{\"metric\": \"empathy\", \"score\": 7, \
                   \"justification\": \"listens well\"}]}\n\
                   Let me know if you need more detail.";
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].score, ScoreValue::Integer(7));
    }

    #[test]
    fn legacy_single_metric_shape_parses() {
        let raw = r#"{"score": 9, "explanation": "exceptionally considerate"}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].justification, "exceptionally considerate");
    }

    #[test]
    fn bare_map_shape_parses() {
        let raw = r#"{"empathy": 8, "clarity": {"score": 5, "justification": "meanders"}}"#;
        let outcome = parse(raw, &metrics(&["empathy", "clarity"])).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[1].justification, "meanders");
    }

    #[test]
    fn line_pattern_fallback_parses() {
        let raw = "My verdict:\nEmpathy: 8 - genuinely warm\nClarity: 4, rambling in places";
        let outcome = parse(raw, &metrics(&["empathy", "clarity"])).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].score, ScoreValue::Integer(8));
        assert_eq!(outcome.results[0].justification, "genuinely warm");
        assert_eq!(outcome.results[1].score, ScoreValue::Integer(4));
    }

    #[test]
    fn missing_metric_is_per_metric_failure() {
        let raw = r#"{"results": [
            {"metric": "empathy", "score": 8, "justification": "x"},
            {"metric": "clarity", "score": 6, "justification": "y"}
        ]}"#;
        let outcome = parse(raw, &metrics(&["empathy", "clarity", "coherence"])).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].metric_id, "coherence");
        assert_eq!(outcome.failures[0].failure, MetricFailure::MissingField);
    }

    #[test]
    fn all_metrics_missing_is_whole_call_malformed() {
        let raw = r#"{"results": [{"metric": "sparkle", "score": 10, "justification": "?"}]}"#;
        let err = parse(raw, &metrics(&["empathy", "clarity"])).unwrap_err();
        assert!(matches!(err, EvalError::MalformedResponse(_)));
    }

    #[test]
    fn unparseable_output_is_malformed() {
        let err = parse("I cannot help with that.", &metrics(&["empathy"])).unwrap_err();
        assert!(matches!(err, EvalError::MalformedResponse(_)));
    }

    #[test]
    fn out_of_range_score_is_reported_not_clamped() {
        let raw = r#"{"results": [{"metric": "empathy", "score": 42, "justification": "!"}]}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(
            outcome.failures[0].failure,
            MetricFailure::OutOfRange { raw: "42".into() }
        );
    }

    #[test]
    fn fractional_score_is_out_of_range_for_integer_scale() {
        let raw = r#"{"results": [{"metric": "empathy", "score": 7.5, "justification": ""}]}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(
            outcome.failures[0].failure,
            MetricFailure::OutOfRange { raw: "7.5".into() }
        );
    }

    #[test]
    fn numeric_string_score_is_accepted() {
        let raw = r#"{"results": [{"metric": "empathy", "score": "8", "justification": ""}]}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(outcome.results[0].score, ScoreValue::Integer(8));
    }

    #[test]
    fn extra_metrics_are_ignored() {
        let raw = r#"{"results": [
            {"metric": "empathy", "score": 8, "justification": "x"},
            {"metric": "sparkle", "score": 3, "justification": "not requested"}
        ]}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn conflicting_duplicate_entries_are_malformed_for_that_metric() {
        let raw = r#"{"results": [
            {"metric": "empathy", "score": 8, "justification": "a"},
            {"metric": "empathy", "score": 2, "justification": "b"},
            {"metric": "clarity", "score": 6, "justification": "c"}
        ]}"#;
        let outcome = parse(raw, &metrics(&["empathy", "clarity"])).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].metric_id, "clarity");
        assert!(matches!(
            outcome.failures[0].failure,
            MetricFailure::Malformed { .. }
        ));
    }

    #[test]
    fn agreeing_duplicate_entries_are_accepted() {
        let raw = r#"{"results": [
            {"metric": "empathy", "score": 8, "justification": "a"},
            {"metric": "empathy", "score": 8, "justification": "a again"}
        ]}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].score, ScoreValue::Integer(8));
    }

    #[test]
    fn positional_association_when_keys_absent() {
        let raw = r#"{"results": [
            {"score": 8, "justification": "first rubric"},
            {"score": 5, "justification": "second rubric"}
        ]}"#;
        let outcome = parse(raw, &metrics(&["empathy", "clarity"])).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].metric_id, "empathy");
        assert_eq!(outcome.results[1].metric_id, "clarity");
    }

    #[test]
    fn keyless_entries_with_wrong_count_cannot_associate() {
        // Two keyless entries for three metrics: no positional mapping.
        let raw = r#"{"results": [
            {"score": 8, "justification": "x"},
            {"score": 5, "justification": "y"}
        ]}"#;
        let err = parse(raw, &metrics(&["empathy", "clarity", "coherence"])).unwrap_err();
        assert!(matches!(err, EvalError::MalformedResponse(_)));
    }

    #[test]
    fn display_name_matches_case_insensitively() {
        let raw = r#"{"results": [{"metric": "Empathy", "score": 8, "justification": ""}]}"#;
        let outcome = parse(raw, &metrics(&["empathy"])).unwrap();
        assert_eq!(outcome.results[0].metric_id, "empathy");
    }
}
