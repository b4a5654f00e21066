//! Analysis prompt construction.

use super::types::{AnalysisRequest, Category};

/// Prompt sent by the provider probe.
pub const PROBE_PROMPT: &str =
    r#"Respond with a simple JSON object: {"status": "ok", "message": "test successful"}"#;

/// Build the prompt every provider receives for `request`.
pub fn build_analysis_prompt(request: &AnalysisRequest) -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();

    let mut prompt =
        String::from("Analyze this email and provide a structured response in JSON format:\n\n");
    prompt.push_str(&format!(
        "Subject: {}\n",
        request.subject().unwrap_or("No subject")
    ));
    prompt.push_str(&format!("From: {}\n", request.sender()));
    prompt.push_str(&format!("Body: {}\n\n", request.body_excerpt()));

    prompt.push_str("Please respond with a JSON object containing:\n{\n");
    prompt.push_str(&format!(
        "  \"category\": \"one of: {}\",\n",
        categories.join(", ")
    ));
    prompt.push_str("  \"priority\": \"high, medium, or low\",\n");
    prompt.push_str("  \"sentiment\": \"positive, neutral, or negative\",\n");
    prompt.push_str("  \"confidence\": \"decimal between 0.0 and 1.0\",\n");
    prompt.push_str("  \"summary\": \"brief 1-2 sentence summary\",\n");
    prompt.push_str("  \"action_required\": \"true or false\",\n");
    prompt.push_str("  \"suggested_actions\": [\"array of suggested actions if any\"]\n");
    prompt.push_str("}\n\n");
    prompt.push_str("Only respond with valid JSON, no additional text.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_email_fields() {
        let request = AnalysisRequest::new(
            Some("Q3 budget".into()),
            "cfo@example.com",
            "Please review the attached numbers.",
        );
        let prompt = build_analysis_prompt(&request);
        assert!(prompt.contains("Subject: Q3 budget\n"));
        assert!(prompt.contains("From: cfo@example.com\n"));
        assert!(prompt.contains("Body: Please review the attached numbers.\n"));
        assert!(prompt.contains(
            "one of: work, personal, marketing, finance, travel, shopping, social, spam, important"
        ));
        assert!(prompt.ends_with("Only respond with valid JSON, no additional text."));
    }

    #[test]
    fn missing_subject_is_labelled() {
        let request = AnalysisRequest::new(None, "a@b.com", "hi");
        assert!(build_analysis_prompt(&request).contains("Subject: No subject\n"));
    }
}
