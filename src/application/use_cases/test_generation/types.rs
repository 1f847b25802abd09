use crate::domain::test_case::{Priority, TestCaseCategory, TestCaseDraft};
use serde::Deserialize;
use serde_json::Value;

/// One entry as the model wrote it. Every field is optional so that a single
/// malformed entry is dropped by validation instead of failing the whole parse.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct RawTestCase {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) category: Option<String>,
    #[serde(default)]
    pub(crate) priority: Option<String>,
    #[serde(default)]
    pub(crate) steps: Option<Vec<Value>>,
    #[serde(default, alias = "expectedResult", alias = "expected")]
    pub(crate) expected_result: Option<String>,
    #[serde(default)]
    pub(crate) tags: Option<Vec<Value>>,
}

/// Why an entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    MissingTitle,
    StepCount(usize),
}

impl RawTestCase {
    pub(crate) fn into_draft(self) -> std::result::Result<TestCaseDraft, Rejection> {
        let title = self
            .title
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(Rejection::MissingTitle)?;

        let steps: Vec<String> = self
            .steps
            .unwrap_or_default()
            .iter()
            .filter_map(value_to_text)
            .map(|step| step.trim().to_string())
            .filter(|step| !step.is_empty())
            .collect();

        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.unwrap_or_default().iter().filter_map(value_to_text) {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let draft = TestCaseDraft {
            title,
            description: self.description.unwrap_or_default().trim().to_string(),
            category: self
                .category
                .as_deref()
                .and_then(TestCaseCategory::parse_lenient)
                .unwrap_or(TestCaseCategory::Functional),
            priority: self
                .priority
                .as_deref()
                .and_then(Priority::parse)
                .unwrap_or_default(),
            steps,
            expected_result: self.expected_result.unwrap_or_default().trim().to_string(),
            tags,
        };

        if draft.has_valid_steps() {
            Ok(draft)
        } else {
            Err(Rejection::StepCount(draft.steps.len()))
        }
    }
}

/// Steps arrive either as strings or as `{ "action": ... }`-style objects.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(map) => ["action", "step", "description", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Locates the list of entries: a top-level array, or an object wrapping one.
pub(crate) fn entries_of(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => ["testCases", "test_cases", "cases"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawTestCase {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_normalises_fields() {
        let draft = raw(json!({
            "title": "  Login works ",
            "category": "Edge Case",
            "priority": "HIGH",
            "steps": ["1", " ", "open page", {"action": "type user"}, "type pass", "submit"],
            "expectedResult": "dashboard",
            "tags": ["Auth", "auth", " smoke "]
        }))
        .into_draft()
        .unwrap();

        assert_eq!(draft.title, "Login works");
        assert_eq!(draft.category, TestCaseCategory::EdgeCase);
        assert_eq!(draft.priority, Priority::High);
        assert_eq!(draft.steps.len(), 5);
        assert_eq!(draft.steps[2], "type user");
        assert_eq!(draft.expected_result, "dashboard");
        assert_eq!(draft.tags, vec!["auth", "smoke"]);
    }

    #[test]
    fn test_unknown_category_and_priority_fall_back() {
        let draft = raw(json!({
            "title": "t",
            "category": "performance",
            "priority": "urgent",
            "steps": ["a", "b", "c", "d", "e"]
        }))
        .into_draft()
        .unwrap();
        assert_eq!(draft.category, TestCaseCategory::Functional);
        assert_eq!(draft.priority, Priority::Medium);
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            raw(json!({"title": " ", "steps": ["a", "b", "c", "d", "e"]})).into_draft(),
            Err(Rejection::MissingTitle)
        );
        assert_eq!(
            raw(json!({"title": "t", "steps": ["a", "", "c", "d", "e"]})).into_draft(),
            Err(Rejection::StepCount(4))
        );
        let eleven: Vec<String> = (0..11).map(|i| format!("step {i}")).collect();
        assert_eq!(
            raw(json!({"title": "t", "steps": eleven})).into_draft(),
            Err(Rejection::StepCount(11))
        );
        assert_eq!(
            raw(json!({"title": "t"})).into_draft(),
            Err(Rejection::StepCount(0))
        );
    }

    #[test]
    fn test_entries_of_accepts_wrappers() {
        assert_eq!(entries_of(json!([1])), Some(vec![json!(1)]));
        assert_eq!(entries_of(json!({"testCases": [2]})), Some(vec![json!(2)]));
        assert_eq!(entries_of(json!({"test_cases": [3]})), Some(vec![json!(3)]));
        assert_eq!(entries_of(json!({"other": [4]})), None);
        assert_eq!(entries_of(json!("x")), None);
    }
}
