// SPDX-License-Identifier: MIT
// View-models pushed to the UI shell, and the pipeline stage events.

use serde::{Deserialize, Serialize};

/// Notification names marking pipeline stage transitions.
pub mod events {
    pub const NO_SCREENSHOTS: &str = "processing.noScreenshots";
    pub const INITIAL_START: &str = "processing.initialStart";
    pub const PROBLEM_EXTRACTED: &str = "processing.problemExtracted";
    pub const SOLUTION_SUCCESS: &str = "processing.solutionSuccess";
    pub const INITIAL_SOLUTION_ERROR: &str = "processing.initialSolutionError";
    pub const DEBUG_START: &str = "processing.debugStart";
    pub const DEBUG_SUCCESS: &str = "processing.debugSuccess";
    pub const DEBUG_ERROR: &str = "processing.debugError";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProblemExample {
    pub input: String,
    pub output: String,
    pub explanation: String,
}

/// Problem statement extracted from the screenshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProblemInfo {
    pub title: String,
    pub description: String,
    pub examples: Vec<ProblemExample>,
    pub constraints: Vec<String>,
    pub difficulty: String,
}

impl ProblemInfo {
    /// Placeholder shown when the model reply could not be parsed at all —
    /// the user is asked to retry rather than being shown raw text as a
    /// problem statement.
    pub fn retry_placeholder() -> Self {
        Self {
            title: "Extraction failed".to_string(),
            description: "The model reply could not be parsed as a problem statement. \
                          Please capture the problem again and retry."
                .to_string(),
            examples: vec![],
            constraints: vec![],
            difficulty: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Complexity {
    pub time: String,
    pub space: String,
}

/// Generated solution for the extracted problem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Solution {
    pub approach: String,
    pub complexity: Complexity,
    pub code: String,
    pub walkthrough: String,
}

impl Solution {
    /// Degraded solution carrying the raw model reply verbatim in `code`.
    pub fn from_raw(raw: String) -> Self {
        Self {
            approach: "The model reply was not structured; showing it as-is.".to_string(),
            complexity: Complexity::default(),
            code: raw,
            walkthrough: String::new(),
        }
    }
}

/// Debug analysis of the extra screenshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugResult {
    pub issue: String,
    pub fix: String,
    pub explanation: String,
}

impl DebugResult {
    /// Degraded result carrying the raw model reply verbatim in `fix`.
    pub fn from_raw(raw: String) -> Self {
        Self {
            issue: "The model reply was not structured; showing it as-is.".to_string(),
            fix: raw,
            explanation: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_model_json_still_deserializes() {
        // Models frequently omit fields; serde defaults fill the gaps.
        let p: ProblemInfo =
            serde_json::from_str(r#"{"title":"Two Sum","difficulty":"easy"}"#).unwrap();
        assert_eq!(p.title, "Two Sum");
        assert!(p.examples.is_empty());
        assert!(p.description.is_empty());
    }

    #[test]
    fn view_models_serialize_camel_case() {
        let s = Solution::default();
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("walkthrough").is_some());
        assert!(v["complexity"].get("time").is_some());
    }
}
