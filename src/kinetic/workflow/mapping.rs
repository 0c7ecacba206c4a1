// SPDX-License-Identifier: MIT

//! Dotted-path input/output mapping between steps

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::types::WorkflowStep;

/// Prefix that addresses the workflow's top-level input instead of a step result
const INPUT_PREFIX: &str = "input";

/// Extract a value from JSON using a simple dot-notation path.
/// Numeric segments index into arrays.
pub fn extract_path(json: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(json.clone());
    }

    let mut current = json;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }

    Some(current.clone())
}

/// Build a step's effective input: the workflow input, overlaid with values
/// pulled from completed steps via `stepId.field` paths (or `input.field`)
pub fn resolve_step_input(
    step: &WorkflowStep,
    workflow_input: &Map<String, Value>,
    step_results: &BTreeMap<String, Value>,
) -> Map<String, Value> {
    let mut resolved = workflow_input.clone();

    for (target, source) in &step.input_mapping {
        let (head, rest) = match source.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (source.as_str(), ""),
        };

        let value = if let Some(result) = step_results.get(head) {
            extract_path(result, rest)
        } else if head == INPUT_PREFIX {
            extract_path(&Value::Object(workflow_input.clone()), rest)
        } else {
            None
        };

        match value {
            Some(v) => {
                resolved.insert(target.clone(), v);
            }
            None => log::warn!(
                "Step {}: input mapping '{}' <- '{}' did not resolve",
                step.id,
                target,
                source
            ),
        }
    }

    resolved
}

/// Shape a step's raw response for storage under `stepResults[stepId]`.
/// Without an output mapping the raw response is stored as-is.
pub fn apply_output_mapping(mapping: &BTreeMap<String, String>, raw: Value) -> Value {
    if mapping.is_empty() {
        return raw;
    }

    let mut shaped = Map::new();
    for (field, path) in mapping {
        if let Some(v) = extract_path(&raw, path) {
            shaped.insert(field.clone(), v);
        }
    }
    Value::Object(shaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_with_inputs(pairs: &[(&str, &str)]) -> WorkflowStep {
        WorkflowStep {
            id: "b".to_string(),
            service: "svc".to_string(),
            endpoint: "/run".to_string(),
            method: Default::default(),
            timeout_ms: 0,
            retry_count: 0,
            depends_on: vec!["a"].into(),
            input_mapping: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            output_mapping: BTreeMap::new(),
        }
    }

    #[test]
    fn test_extract_path() {
        let json = json!({
            "result": {
                "data": {
                    "value": 42
                },
                "items": [{"name": "first"}, {"name": "second"}]
            }
        });

        assert_eq!(
            extract_path(&json, "result.data"),
            Some(json!({"value": 42}))
        );
        assert_eq!(extract_path(&json, "result.data.value"), Some(json!(42)));
        assert_eq!(
            extract_path(&json, "result.items.1.name"),
            Some(json!("second"))
        );
        assert_eq!(extract_path(&json, "nonexistent"), None);
        assert_eq!(extract_path(&json, "result.items.9"), None);
    }

    #[test]
    fn test_input_mapping_pulls_from_completed_step() {
        let step = step_with_inputs(&[("target", "a.x")]);
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), json!({"x": 1}));

        let resolved = resolve_step_input(&step, &Map::new(), &results);
        assert_eq!(resolved.get("target"), Some(&json!(1)));
    }

    #[test]
    fn test_input_mapping_merges_over_workflow_input() {
        let step = step_with_inputs(&[("url", "a.location"), ("lang", "input.language")]);
        let mut input = Map::new();
        input.insert("url".to_string(), json!("original"));
        input.insert("language".to_string(), json!("en"));
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), json!({"location": "resolved"}));

        let resolved = resolve_step_input(&step, &input, &results);
        assert_eq!(resolved["url"], "resolved");
        assert_eq!(resolved["lang"], "en");
        assert_eq!(resolved["language"], "en");
    }

    #[test]
    fn test_unresolved_mapping_is_skipped() {
        let step = step_with_inputs(&[("missing", "zzz.field")]);
        let resolved = resolve_step_input(&step, &Map::new(), &BTreeMap::new());
        assert!(resolved.get("missing").is_none());
    }

    #[test]
    fn test_whole_step_result_mapping() {
        let step = step_with_inputs(&[("previous", "a")]);
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), json!({"k": "v"}));

        let resolved = resolve_step_input(&step, &Map::new(), &results);
        assert_eq!(resolved["previous"], json!({"k": "v"}));
    }

    #[test]
    fn test_output_mapping() {
        let raw = json!({"text": "hello", "meta": {"language": "en"}, "noise": true});
        let mut mapping = BTreeMap::new();
        mapping.insert("transcript".to_string(), "text".to_string());
        mapping.insert("language".to_string(), "meta.language".to_string());

        let shaped = apply_output_mapping(&mapping, raw.clone());
        assert_eq!(shaped, json!({"transcript": "hello", "language": "en"}));

        assert_eq!(apply_output_mapping(&BTreeMap::new(), raw.clone()), raw);
    }
}
