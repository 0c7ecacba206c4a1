// SPDX-License-Identifier: MIT

//! Workflow loader - YAML/JSON file loading and parsing

use super::types::WorkflowDefinition;
use crate::adk::error::Result;
use std::fs;
use std::path::Path;

/// Loads workflow definitions from YAML or JSON files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition, choosing the format by file extension
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse a workflow definition from a JSON string
    pub fn parse_json(content: &str) -> Result<WorkflowDefinition> {
        Ok(serde_json::from_str(content)?)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::invoker::HttpMethod;
    use crate::adk::retry::BackoffKind;
    use std::io::Write;

    #[test]
    fn test_parse_yaml_workflow() {
        let yaml = r#"
id: transcribe-pipeline
name: Transcribe Pipeline
timeoutMs: 60000
retryPolicy:
  maxRetries: 2
  backoff: linear
  baseDelayMs: 10
steps:
  - id: download
    service: media
    endpoint: /extract
  - id: transcribe
    service: transcription
    endpoint: /transcribe
    timeoutMs: 5000
    dependsOn: download
    inputMapping:
      mediaFile: download.mediaFile
  - id: enhance
    service: enhancement
    endpoint: /enhance
    method: PUT
    dependsOn: [transcribe]
    outputMapping:
      text: enhancedText
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.id, "transcribe-pipeline");
        assert_eq!(def.version, "1.0.0");
        assert_eq!(def.timeout_ms, 60_000);
        assert_eq!(def.retry_policy.max_retries, 2);
        assert_eq!(def.retry_policy.backoff, BackoffKind::Linear);
        assert_eq!(def.steps.len(), 3);

        let transcribe = def.step("transcribe").unwrap();
        assert_eq!(transcribe.depends_on.to_vec(), vec!["download".to_string()]);
        assert_eq!(
            transcribe.input_mapping.get("mediaFile"),
            Some(&"download.mediaFile".to_string())
        );

        let enhance = def.step("enhance").unwrap();
        assert_eq!(enhance.method, HttpMethod::Put);
        assert_eq!(
            enhance.output_mapping.get("text"),
            Some(&"enhancedText".to_string())
        );
    }

    #[test]
    fn test_parse_json_workflow() {
        let json = r#"{
            "id": "wf",
            "name": "Metadata only",
            "steps": [{"id": "meta", "service": "media", "endpoint": "/metadata"}]
        }"#;
        let def = WorkflowLoader::parse_json(json).unwrap();
        assert_eq!(def.steps[0].id, "meta");
        assert_eq!(def.retry_policy.max_retries, 0);
        assert_eq!(def.timeout_ms, 0);
    }

    #[test]
    fn test_load_workflow_by_extension() {
        let dir = std::env::temp_dir().join(format!("kinetic-loader-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wf.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"id": "j", "name": "J", "steps": [{{"id": "s", "service": "m", "endpoint": "/e"}}]}}"#
        )
        .unwrap();

        let def = WorkflowLoader::new().load_workflow(&path).unwrap();
        assert_eq!(def.id, "j");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let yaml = r#"
id: broken
name:
  - invalid structure
"#;
        assert!(WorkflowLoader::parse_yaml(yaml).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WorkflowLoader::new()
            .load_workflow("/definitely/not/here.yaml")
            .unwrap_err();
        assert!(matches!(err, crate::KineticError::Io(_)));
    }
}
