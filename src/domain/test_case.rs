use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_STEPS: usize = 5;
pub const MAX_STEPS: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseCategory {
    Functional,
    Compliance,
    Integration,
    EdgeCase,
}

impl TestCaseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCaseCategory::Functional => "functional",
            TestCaseCategory::Compliance => "compliance",
            TestCaseCategory::Integration => "integration",
            TestCaseCategory::EdgeCase => "edge_case",
        }
    }

    /// Lenient parse for model output: separators and case are ignored.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "functional" => Some(TestCaseCategory::Functional),
            "compliance" => Some(TestCaseCategory::Compliance),
            "integration" => Some(TestCaseCategory::Integration),
            "edge_case" | "edgecase" | "edge" => Some(TestCaseCategory::EdgeCase),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TestCaseSource {
    Generated,
    Manual,
    Uploaded,
}

impl TestCaseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCaseSource::Generated => "generated",
            TestCaseSource::Manual => "manual",
            TestCaseSource::Uploaded => "uploaded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "generated" => Some(TestCaseSource::Generated),
            "manual" => Some(TestCaseSource::Manual),
            "uploaded" => Some(TestCaseSource::Uploaded),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    NotRun,
    Passed,
    Failed,
    Blocked,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::NotRun => "not_run",
            ExecutionStatus::Passed => "passed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_run" => Some(ExecutionStatus::NotRun),
            "passed" => Some(ExecutionStatus::Passed),
            "failed" => Some(ExecutionStatus::Failed),
            "blocked" => Some(ExecutionStatus::Blocked),
            _ => None,
        }
    }
}

/// A structurally validated, not yet persisted test case.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseDraft {
    pub title: String,
    pub description: String,
    pub category: TestCaseCategory,
    pub priority: Priority,
    pub steps: Vec<String>,
    pub expected_result: String,
    pub tags: Vec<String>,
}

impl TestCaseDraft {
    pub fn has_valid_steps(&self) -> bool {
        (MIN_STEPS..=MAX_STEPS).contains(&self.steps.len())
    }
}

/// Fields of a test case before storage assigns its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTestCase {
    pub document_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub preconditions: Option<String>,
    pub steps: Vec<String>,
    pub expected_result: Option<String>,
    pub tags: Vec<String>,
    pub source: TestCaseSource,
    pub confidence_score: Option<f32>,
    pub context_used: Vec<usize>,
}

impl NewTestCase {
    pub fn from_draft(
        draft: TestCaseDraft,
        document_id: &str,
        confidence_score: f32,
        context_used: &[usize],
    ) -> Self {
        Self {
            document_id: Some(document_id.to_string()),
            title: draft.title,
            description: draft.description,
            category: draft.category.as_str().to_string(),
            priority: draft.priority,
            preconditions: None,
            steps: draft.steps,
            expected_result: Some(draft.expected_result).filter(|value| !value.is_empty()),
            tags: draft.tags,
            source: TestCaseSource::Generated,
            confidence_score: Some(confidence_score),
            context_used: context_used.to_vec(),
        }
    }

    pub fn into_test_case(self, id: String, created_at: i64) -> TestCase {
        TestCase {
            id,
            document_id: self.document_id,
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            preconditions: self.preconditions,
            steps: self.steps,
            expected_result: self.expected_result,
            tags: self.tags,
            source: self.source,
            confidence_score: self.confidence_score,
            context_used: self.context_used,
            execution_status: ExecutionStatus::NotRun,
            created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub document_id: Option<String>,
    pub title: String,
    pub description: String,
    /// One of the draft categories for generated cases; free text for manual ones.
    pub category: String,
    pub priority: Priority,
    pub preconditions: Option<String>,
    pub steps: Vec<String>,
    pub expected_result: Option<String>,
    pub tags: Vec<String>,
    pub source: TestCaseSource,
    pub confidence_score: Option<f32>,
    pub context_used: Vec<usize>,
    pub execution_status: ExecutionStatus,
    pub created_at: i64,
}
