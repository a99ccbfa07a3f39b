// SPDX-License-Identifier: MIT
// Parsing model replies into typed view-models.
//
// Models wrap JSON in Markdown fences, preface it with prose, or return
// plain text. The strategy: strip fences, scan for the first balanced JSON
// object, deserialize. Every failure lands in `Fallback` carrying the
// original reply verbatim, so callers can always distinguish structured
// data from the degraded path.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

/// Tagged result of parsing an LLM reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput<T> {
    Structured(T),
    /// The reply did not contain a parseable object; `raw` is the full
    /// original text, untouched.
    Fallback { raw: String },
}

impl<T> ModelOutput<T> {
    pub fn is_structured(&self) -> bool {
        matches!(self, ModelOutput::Structured(_))
    }

    /// Collapse into a value, building the fallback representation from the
    /// raw text (e.g. `Solution::from_raw`).
    pub fn unwrap_or_else_raw(self, f: impl FnOnce(String) -> T) -> T {
        match self {
            ModelOutput::Structured(v) => v,
            ModelOutput::Fallback { raw } => f(raw),
        }
    }
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|[A-Za-z0-9_+-]*)?\s*(.*?)\s*```").expect("fence regex"));

/// Parse a model reply into `T`, or fall back to the raw text.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> ModelOutput<T> {
    let candidate = strip_fences(raw);
    if let Some(object) = first_json_object(candidate) {
        if let Ok(value) = serde_json::from_str::<T>(object) {
            return ModelOutput::Structured(value);
        }
    }
    ModelOutput::Fallback {
        raw: raw.to_string(),
    }
}

/// Return the contents of the first fenced block, or the input unchanged.
fn strip_fences(raw: &str) -> &str {
    match FENCE_RE.captures(raw) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(raw),
        None => raw.trim(),
    }
}

/// Locate the first balanced `{…}` span, ignoring braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::model::{DebugResult, ProblemInfo, Solution};

    #[test]
    fn parses_clean_json() {
        let out: ModelOutput<ProblemInfo> =
            parse_model_json(r#"{"title":"Two Sum","difficulty":"easy"}"#);
        match out {
            ModelOutput::Structured(p) => assert_eq!(p.title, "Two Sum"),
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn parses_json_inside_markdown_fences() {
        let reply = "Here you go:\n```json\n{\"approach\":\"two pointers\",\"code\":\"fn main(){}\"}\n```\nGood luck!";
        let out: ModelOutput<Solution> = parse_model_json(reply);
        match out {
            ModelOutput::Structured(s) => {
                assert_eq!(s.approach, "two pointers");
                assert_eq!(s.code, "fn main(){}");
            }
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn parses_json_with_leading_prose() {
        let reply = "Sure! The analysis is: {\"issue\":\"off by one\",\"fix\":\"use <=\"} — hope that helps.";
        let out: ModelOutput<DebugResult> = parse_model_json(reply);
        assert!(out.is_structured());
    }

    #[test]
    fn braces_inside_strings_do_not_break_the_scan() {
        let reply = r#"{"issue":"brace } in text","fix":"escaped \" quote"}"#;
        let out: ModelOutput<DebugResult> = parse_model_json(reply);
        match out {
            ModelOutput::Structured(d) => assert_eq!(d.issue, "brace } in text"),
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn malformed_reply_falls_back_with_verbatim_raw() {
        let reply = "I could not find a problem in those screenshots, sorry.";
        let out: ModelOutput<Solution> = parse_model_json(reply);
        match out {
            ModelOutput::Fallback { raw } => assert_eq!(raw, reply),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn truncated_json_falls_back() {
        let reply = r#"{"title":"Two Sum","description":"unterminated"#;
        let out: ModelOutput<ProblemInfo> = parse_model_json(reply);
        assert!(!out.is_structured());
    }

    #[test]
    fn fallback_solution_carries_raw_in_code() {
        let reply = "plain text answer";
        let out: ModelOutput<Solution> = parse_model_json(reply);
        let solution = out.unwrap_or_else_raw(Solution::from_raw);
        assert_eq!(solution.code, reply);
    }
}
