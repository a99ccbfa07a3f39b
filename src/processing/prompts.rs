// SPDX-License-Identifier: MIT
// Prompt builders for the three pipeline calls. Instructions are fixed
// strings; only the problem context varies.

use crate::llm::{ChatMessage, ChatRequest};
use crate::processing::model::ProblemInfo;

pub const EXTRACT_SYSTEM: &str = "You are an assistant that reads screenshots of coding \
interview problems. Reply with a single JSON object: {\"title\", \"description\", \
\"examples\": [{\"input\", \"output\", \"explanation\"}], \"constraints\": [string], \
\"difficulty\"}. No markdown, no commentary.";

pub const EXTRACT_INSTRUCTION: &str =
    "Extract the coding problem shown in this screenshot into the JSON schema.";

pub const SOLVE_SYSTEM: &str = "You are an expert competitive programmer. Reply with a single \
JSON object: {\"approach\", \"complexity\": {\"time\", \"space\"}, \"code\", \
\"walkthrough\"}. The code field contains a complete, runnable solution. No markdown, \
no commentary.";

pub const DEBUG_SYSTEM: &str = "You are an expert debugging assistant reviewing screenshots of \
code and failing output. Reply with a single JSON object: {\"issue\", \"fix\", \
\"explanation\"}. No markdown, no commentary.";

pub const DEBUG_INSTRUCTION: &str =
    "Find the bug shown in these screenshots and explain how to fix it.";

/// Extraction: one user message per screenshot, each carrying the image and
/// the fixed instruction.
pub fn extraction_request(images: Vec<String>) -> ChatRequest {
    ChatRequest {
        system: EXTRACT_SYSTEM.to_string(),
        messages: images
            .into_iter()
            .map(|image| ChatMessage {
                text: EXTRACT_INSTRUCTION.to_string(),
                images: vec![image],
            })
            .collect(),
    }
}

/// Solution generation over the extracted problem; text only.
pub fn solution_request(problem: &ProblemInfo) -> ChatRequest {
    ChatRequest {
        system: SOLVE_SYSTEM.to_string(),
        messages: vec![ChatMessage {
            text: format!("Solve this problem:\n\n{}", render_problem(problem)),
            images: vec![],
        }],
    }
}

/// Debug analysis: problem context plus the extra screenshots in one message.
pub fn debug_request(problem: Option<&ProblemInfo>, images: Vec<String>) -> ChatRequest {
    let context = match problem {
        Some(p) => format!("Problem under debugging:\n\n{}\n\n", render_problem(p)),
        None => String::new(),
    };
    ChatRequest {
        system: DEBUG_SYSTEM.to_string(),
        messages: vec![ChatMessage {
            text: format!("{context}{DEBUG_INSTRUCTION}"),
            images,
        }],
    }
}

fn render_problem(problem: &ProblemInfo) -> String {
    let mut out = format!("# {}\n\n{}\n", problem.title, problem.description);
    if !problem.constraints.is_empty() {
        out.push_str("\nConstraints:\n");
        for c in &problem.constraints {
            out.push_str(&format!("- {c}\n"));
        }
    }
    for (i, ex) in problem.examples.iter().enumerate() {
        out.push_str(&format!(
            "\nExample {}:\nInput: {}\nOutput: {}\n",
            i + 1,
            ex.input,
            ex.output
        ));
        if !ex.explanation.is_empty() {
            out.push_str(&format!("Explanation: {}\n", ex.explanation));
        }
    }
    if !problem.difficulty.is_empty() {
        out.push_str(&format!("\nDifficulty: {}\n", problem.difficulty));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::model::ProblemExample;

    #[test]
    fn extraction_builds_one_message_per_screenshot() {
        let req = extraction_request(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].images, vec!["a"]);
        assert_eq!(req.messages[1].images, vec!["b"]);
        assert!(req.messages.iter().all(|m| m.text == EXTRACT_INSTRUCTION));
    }

    #[test]
    fn solution_prompt_renders_the_problem() {
        let problem = ProblemInfo {
            title: "Two Sum".to_string(),
            description: "Find two numbers adding to target.".to_string(),
            examples: vec![ProblemExample {
                input: "[2,7], 9".to_string(),
                output: "[0,1]".to_string(),
                explanation: String::new(),
            }],
            constraints: vec!["n <= 10^4".to_string()],
            difficulty: "easy".to_string(),
        };
        let req = solution_request(&problem);
        let text = &req.messages[0].text;
        assert!(text.contains("Two Sum"));
        assert!(text.contains("n <= 10^4"));
        assert!(text.contains("[0,1]"));
        assert!(req.messages[0].images.is_empty());
    }

    #[test]
    fn debug_prompt_works_without_problem_context() {
        let req = debug_request(None, vec!["img".to_string()]);
        assert_eq!(req.messages.len(), 1);
        assert!(req.messages[0].text.starts_with(DEBUG_INSTRUCTION));
        assert_eq!(req.messages[0].images.len(), 1);
    }
}
