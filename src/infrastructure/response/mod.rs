use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

static FENCE_OPEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());

/// Removes reasoning artefacts some models prepend to their answer.
pub fn clean_llm_response(response: &str) -> String {
    let cleaned = THINK_TAG_PATTERN.replace_all(response, "");
    let cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Strips a fenced-block wrapper (```json ... ```) around a payload.
/// Text without a leading fence is returned trimmed and otherwise untouched.
pub fn strip_code_fence(value: &str) -> String {
    let trimmed = value.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = FENCE_OPEN_PATTERN.replace(trimmed, "");
    let without_close = without_open.trim_end();
    without_close
        .strip_suffix("```")
        .unwrap_or(without_close)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>Some reasoning here</think>[1, 2]";
        assert_eq!(clean_llm_response(input), "[1, 2]");
    }

    #[test]
    fn test_clean_self_closing_think() {
        assert_eq!(clean_llm_response("<think />{}"), "{}");
    }

    #[test]
    fn test_clean_reasoning_tags() {
        let input = "<reasoning>Internal reasoning</reasoning>\n{\"a\": 1}";
        assert_eq!(clean_llm_response(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fence() {
        let input = "```json\n[{\"title\": \"x\"}]\n```";
        assert_eq!(strip_code_fence(input), "[{\"title\": \"x\"}]");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_code_fence("```\n{}\n```  "), "{}");
    }

    #[test]
    fn test_strip_unterminated_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_no_fence_is_untouched() {
        let input = "  {\"code\": \"```\"}  ";
        assert_eq!(strip_code_fence(input), "{\"code\": \"```\"}");
    }
}
