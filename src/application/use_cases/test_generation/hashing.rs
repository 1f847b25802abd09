use crate::domain::test_case::TestCaseDraft;
use sha2::{Digest, Sha256};

/// Identity of a draft for duplicate detection: case- and whitespace-insensitive
/// title plus the ordered steps.
pub(crate) fn draft_fingerprint(draft: &TestCaseDraft) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(&draft.title).as_bytes());
    for step in &draft.steps {
        hasher.update(b"\x1f");
        hasher.update(normalize(step).as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
