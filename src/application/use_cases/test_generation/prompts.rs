use crate::domain::generation::GenerationRequest;
use crate::domain::test_case::{MAX_STEPS, MIN_STEPS};

pub(crate) const MIN_CASES: usize = 10;
pub(crate) const MAX_CASES: usize = 15;

/// Category mix requested from the model. Guidance only; not checked afterwards.
pub(crate) const CATEGORY_DISTRIBUTION: [(&str, u8); 4] = [
    ("functional", 40),
    ("edge_case", 30),
    ("compliance", 20),
    ("integration", 10),
];

pub(crate) fn build_system_prompt() -> String {
    let distribution = CATEGORY_DISTRIBUTION
        .iter()
        .map(|(category, share)| format!("{} {}%", category, share))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a senior QA engineer. Write test cases for the business document excerpts you are given.

Hard rules:
1. Produce between {min_cases} and {max_cases} test cases.
2. Category distribution: {distribution}.
3. Every test case has between {min_steps} and {max_steps} steps. Each step is one concrete, executable instruction (what to open, what to enter, what to click, what to check).
4. Base every test case on the document content. Do not invent features the document does not describe.

Return only a JSON array, no prose and no code fences. Each item:
{{"title": string, "description": string, "category": "functional" | "edge_case" | "compliance" | "integration", "priority": "high" | "medium" | "low", "steps": [string], "expected_result": string, "tags": [string]}}"#,
        min_cases = MIN_CASES,
        max_cases = MAX_CASES,
        distribution = distribution,
        min_steps = MIN_STEPS,
        max_steps = MAX_STEPS,
    )
}

pub(crate) fn build_user_prompt(request: &GenerationRequest) -> String {
    let mut body = String::new();
    body.push_str(&format!("Document title: {}\n", request.document_title));
    body.push_str(&format!("Document type: {}\n", request.document_type));

    if let Some(requirements) = request
        .requirements
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        body.push_str(&format!("Additional requirements: {}\n", requirements));
    }

    body.push_str("\nDocument excerpts:\n");
    for context in &request.context {
        body.push_str(&format!("\n[Excerpt {}]\n", context.chunk_index + 1));
        body.push_str(context.content.trim());
        body.push('\n');
    }

    body
}
