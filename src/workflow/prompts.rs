//! Prompt policy for the maker and checker steps.

use std::fmt::Write as _;

use checkloop_common::{RunRequest, Verdict};

/// Sent on a continued task when the last check passed but the loop goes on.
pub const REFINE_PROMPT: &str =
    "The previous version passed review. Polish it further without changing its structure, \
and attach the updated file.";

/// Full first-iteration prompt: the generation prompt followed by guidelines.
pub fn initial_maker_prompt(request: &RunRequest) -> String {
    let guidelines = request.guidelines.trim();
    if guidelines.is_empty() {
        return request.generation_prompt.trim().to_string();
    }
    format!(
        "{}\n\n## Guidelines\n{}",
        request.generation_prompt.trim(),
        guidelines
    )
}

/// Prompt for maker call `iteration`.
///
/// Only the first call carries the original prompt. Later calls continue the
/// same upstream task and send nothing but the pending feedback.
pub fn maker_prompt(request: &RunRequest, iteration: u32, pending_feedback: Option<&str>) -> String {
    if iteration <= 1 {
        return initial_maker_prompt(request);
    }
    match pending_feedback {
        Some(feedback) if !feedback.trim().is_empty() => feedback.to_string(),
        _ => REFINE_PROMPT.to_string(),
    }
}

/// Checker prompt: criteria, guidelines, round, previous feedback and the
/// pass bar, followed by the required reply format.
pub fn review_prompt(
    request: &RunRequest,
    iteration: u32,
    previous_feedback: Option<&str>,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "## Review criteria\n{}\n", request.review_prompt.trim());
    if !request.guidelines.trim().is_empty() {
        let _ = writeln!(prompt, "## Guidelines\n{}\n", request.guidelines.trim());
    }
    let _ = writeln!(prompt, "## Round\nThis is review round {}.\n", iteration);
    if let Some(feedback) = previous_feedback.filter(|f| !f.trim().is_empty()) {
        let _ = writeln!(
            prompt,
            "## Previous feedback\nThe last round asked for these changes. Check whether they were made:\n{}\n",
            feedback.trim()
        );
    }
    let _ = writeln!(
        prompt,
        "## Pass bar\nOnly pass the output if you are at least {:.0}% confident it meets every criterion.\n",
        request.config.confidence_threshold * 100.0
    );
    prompt.push_str(
        "## Reply format\nReply with one JSON object and nothing else:\n\
{\"passed\": boolean, \"confidence\": number between 0 and 1, \"feedback\": string, \"issues\": [string]}",
    );
    prompt
}

/// Feedback for the next maker call. `None` when the check passed.
pub fn feedback_for(verdict: &Verdict) -> Option<String> {
    if verdict.passed {
        return None;
    }
    let mut text = verdict.feedback.trim().to_string();
    if !verdict.issues.is_empty() {
        text.push_str("\n\nIssues to fix:");
        for (i, issue) in verdict.issues.iter().enumerate() {
            let _ = write!(text, "\n{}. {}", i + 1, issue);
        }
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkloop_common::RunConfig;

    fn request(guidelines: &str) -> RunRequest {
        RunRequest {
            generation_prompt: "Build a 5-slide deck on solar power".into(),
            review_prompt: "Every slide needs a source".into(),
            guidelines: guidelines.into(),
            inputs: vec![],
            references: vec![],
            config: RunConfig::default(),
        }
    }

    #[test]
    fn test_first_iteration_uses_full_prompt() {
        let prompt = maker_prompt(&request("Use brand colors"), 1, None);
        assert!(prompt.starts_with("Build a 5-slide deck"));
        assert!(prompt.contains("Use brand colors"));
    }

    #[test]
    fn test_later_iterations_send_only_feedback() {
        let prompt = maker_prompt(&request("Use brand colors"), 2, Some("Add sources"));
        assert_eq!(prompt, "Add sources");
    }

    #[test]
    fn test_later_iteration_without_feedback_refines() {
        assert_eq!(maker_prompt(&request(""), 3, None), REFINE_PROMPT);
    }

    #[test]
    fn test_feedback_lists_numbered_issues() {
        let verdict = Verdict {
            passed: false,
            confidence: 0.3,
            feedback: "Needs work".into(),
            issues: vec!["Slide 2 has no source".into(), "Typo on slide 4".into()],
        };
        assert_eq!(
            feedback_for(&verdict).unwrap(),
            "Needs work\n\nIssues to fix:\n1. Slide 2 has no source\n2. Typo on slide 4"
        );
    }

    #[test]
    fn test_passed_verdict_clears_feedback() {
        let verdict = Verdict {
            passed: true,
            confidence: 0.5,
            feedback: "Fine".into(),
            issues: vec!["minor".into()],
        };
        assert!(feedback_for(&verdict).is_none());
    }

    #[test]
    fn test_review_prompt_sections() {
        let first = review_prompt(&request(""), 1, None);
        assert!(first.contains("review round 1"));
        assert!(first.contains("80%"));
        assert!(!first.contains("Previous feedback"));
        assert!(!first.contains("Guidelines"));

        let second = review_prompt(&request("Be concise"), 2, Some("Add sources"));
        assert!(second.contains("Previous feedback"));
        assert!(second.contains("Add sources"));
        assert!(second.contains("Be concise"));
    }
}
