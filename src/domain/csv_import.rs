use crate::domain::test_case::TestCase;
use serde::{Deserialize, Serialize};

/// Column order of the downloadable template and of exports.
pub const TEMPLATE_COLUMNS: [&str; 8] = [
    "title",
    "description",
    "category",
    "priority",
    "preconditions",
    "steps",
    "expected_result",
    "source",
];

pub const REQUIRED_COLUMNS: [&str; 2] = ["title", "description"];

pub const DEFAULT_MANUAL_CATEGORY: &str = "Manual";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub created: usize,
    pub errors: Vec<String>,
    pub test_cases: Vec<TestCase>,
}
