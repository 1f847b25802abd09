use crate::domain::csv_import::DEFAULT_MANUAL_CATEGORY;
use crate::domain::error::{AppError, Result};
use crate::domain::test_case::{NewTestCase, Priority, TestCase, TestCaseSource};
use crate::infrastructure::storage::{now_millis, Storage};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Merges a document's test cases with an authoritative manual list.
///
/// Non-manual entries of `existing` are kept in their order; every manual entry
/// of `existing` is superseded by `authoritative`, which follows in its own
/// order. An id repeated in `authoritative` keeps its first occurrence, and an
/// authoritative id that collides with a retained entry replaces it.
pub fn reconcile(existing: &[TestCase], authoritative: &[TestCase]) -> Vec<TestCase> {
    let mut authoritative_ids = HashSet::new();
    let authoritative: Vec<&TestCase> = authoritative
        .iter()
        .filter(|case| authoritative_ids.insert(case.id.as_str()))
        .collect();

    existing
        .iter()
        .filter(|case| case.source != TestCaseSource::Manual)
        .filter(|case| !authoritative_ids.contains(case.id.as_str()))
        .chain(authoritative)
        .cloned()
        .collect()
}

/// One row of a submitted manual list. Items without an id are new.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ManualTestCaseInput {
    pub id: Option<String>,
    #[validate(custom(function = "not_blank"))]
    pub title: String,
    #[validate(custom(function = "not_blank"))]
    pub description: String,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub preconditions: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    pub expected_result: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::from("must not be blank"));
        return Err(error);
    }
    Ok(())
}

pub struct ReconcileUseCase {
    storage: Arc<dyn Storage>,
}

impl ReconcileUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Stored test cases of a document after reconciliation.
    pub async fn combined_view(&self, document_id: &str) -> Result<Vec<TestCase>> {
        self.storage.get_test_cases(Some(document_id)).await
    }

    /// Replaces the document's manual set with `items` and returns the merged view.
    pub async fn submit_manual_set(
        &self,
        document_id: &str,
        items: Vec<ManualTestCaseInput>,
    ) -> Result<Vec<TestCase>> {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(AppError::ValidationError(
                "Document id is required.".to_string(),
            ));
        }
        for item in &items {
            item.validate()?;
        }

        let existing = self.storage.get_test_cases(Some(document_id)).await?;
        for id in items.iter().filter_map(|item| item.id.as_deref()) {
            let id = id.trim();
            if !id.is_empty() && !existing.iter().any(|case| case.id == id) {
                warn!(document_id = %document_id, test_case_id = %id, "Rejected foreign test case id");
                return Err(AppError::ValidationError(format!(
                    "Test case {} does not belong to document {}.",
                    id, document_id
                )));
            }
        }

        let created_at = now_millis();
        let authoritative: Vec<TestCase> = items
            .into_iter()
            .map(|item| to_manual_case(item, document_id, &existing, created_at))
            .collect();

        let merged = reconcile(&existing, &authoritative);
        let kept: HashSet<&str> = merged.iter().map(|case| case.id.as_str()).collect();
        let dropped: Vec<String> = existing
            .iter()
            .filter(|case| !kept.contains(case.id.as_str()))
            .map(|case| case.id.clone())
            .collect();

        let manual: Vec<TestCase> = merged
            .iter()
            .filter(|case| case.source == TestCaseSource::Manual)
            .cloned()
            .collect();
        self.storage.replace_test_cases(&dropped, &manual).await?;

        info!(
            document_id = %document_id,
            manual = authoritative.len(),
            dropped = dropped.len(),
            total = merged.len(),
            "Reconciled manual test cases"
        );
        Ok(merged)
    }
}

fn to_manual_case(
    item: ManualTestCaseInput,
    document_id: &str,
    existing: &[TestCase],
    created_at: i64,
) -> TestCase {
    let id = item
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let previous = existing.iter().find(|case| case.id == id);

    let mut case = NewTestCase {
        document_id: Some(document_id.to_string()),
        title: item.title.trim().to_string(),
        description: item.description.trim().to_string(),
        category: item
            .category
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MANUAL_CATEGORY.to_string()),
        priority: item
            .priority
            .as_deref()
            .and_then(Priority::parse)
            .unwrap_or_default(),
        preconditions: item.preconditions.filter(|value| !value.trim().is_empty()),
        steps: item
            .steps
            .into_iter()
            .map(|step| step.trim().to_string())
            .filter(|step| !step.is_empty())
            .collect(),
        expected_result: item.expected_result.filter(|value| !value.trim().is_empty()),
        tags: item.tags,
        source: TestCaseSource::Manual,
        confidence_score: None,
        context_used: Vec::new(),
    }
    .into_test_case(id, previous.map(|case| case.created_at).unwrap_or(created_at));

    if let Some(previous) = previous {
        case.execution_status = previous.execution_status;
    }
    case
}
