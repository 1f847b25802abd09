mod hashing;
pub mod json_repair;
mod prompts;
mod types;

use crate::domain::error::GenerationError;
use crate::domain::generation::{GenerationMetadata, GenerationOutput, GenerationRequest};
use crate::domain::test_case::TestCaseDraft;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{clean_llm_response, strip_code_fence};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use hashing::draft_fingerprint;
use json_repair::repair_json;
use prompts::{build_system_prompt, build_user_prompt};
use types::{entries_of, RawTestCase, Rejection};

pub const PROMPT_VERSION: &str = "v1";
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(90);

type GenerationResult<T> = std::result::Result<T, GenerationError>;

/// Prompt, call, parse (with one repair attempt) and validate. No retries.
pub struct GenerationOrchestrator {
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(llm_client: Arc<dyn LLMClient + Send + Sync>, timeout: Duration) -> Self {
        Self {
            llm_client,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        let started = Instant::now();
        let system_prompt = build_system_prompt();
        let user_prompt = build_user_prompt(request);

        // Elapsing drops the in-flight call, which aborts the HTTP request.
        let response = match tokio::time::timeout(
            self.timeout,
            self.llm_client
                .generate(&request.config, &system_prompt, &user_prompt),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(model = %request.config.model, "Generation call failed: {}", err);
                return Err(GenerationError::Provider(err.to_string()));
            }
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                warn!(model = %request.config.model, after_ms, "Generation call timed out");
                return Err(GenerationError::Timeout { after_ms });
            }
        };

        let cleaned = clean_llm_response(&response.text);
        let payload = strip_code_fence(&cleaned);
        let (parsed, repaired) = parse_with_repair(&payload)?;

        let entries = entries_of(parsed).unwrap_or_default();
        let received = entries.len();
        let drafts = validate_entries(entries);
        if drafts.is_empty() {
            return Err(GenerationError::NoValidResults { received });
        }

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            model = %request.config.model,
            received,
            accepted = drafts.len(),
            repaired,
            processing_time_ms,
            "Generated test case drafts"
        );

        Ok(GenerationOutput {
            metadata: GenerationMetadata {
                model: request.config.model.clone(),
                prompt_version: PROMPT_VERSION.to_string(),
                usage: response.usage,
                repaired,
                received,
                dropped: received - drafts.len(),
            },
            test_cases: drafts,
            context_used: request.context.iter().map(|c| c.chunk_index).collect(),
            processing_time_ms,
        })
    }
}

/// Direct parse, then exactly one repaired re-parse.
fn parse_with_repair(payload: &str) -> GenerationResult<(Value, bool)> {
    let first_err = match serde_json::from_str::<Value>(payload) {
        Ok(value) => return Ok((value, false)),
        Err(err) => err,
    };

    let repaired = repair_json(payload);
    debug!(changed = repaired.changed, "Repairing generation output: {}", first_err);
    serde_json::from_str::<Value>(&repaired.text)
        .map(|value| (value, true))
        .map_err(|err| {
            GenerationError::Unrepairable(format!("{} (after repair: {})", first_err, err))
        })
}

/// Keeps entries with a title and 5..=10 steps, first occurrence of each fingerprint.
fn validate_entries(entries: Vec<Value>) -> Vec<TestCaseDraft> {
    let mut seen = HashSet::new();
    let mut drafts = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let raw = match serde_json::from_value::<RawTestCase>(entry) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(index, "Dropping malformed entry: {}", err);
                continue;
            }
        };
        match raw.into_draft() {
            Ok(draft) => {
                if seen.insert(draft_fingerprint(&draft)) {
                    drafts.push(draft);
                } else {
                    debug!(index, "Dropping duplicate entry");
                }
            }
            Err(Rejection::MissingTitle) => debug!(index, "Dropping entry without title"),
            Err(Rejection::StepCount(count)) => {
                debug!(index, steps = count, "Dropping entry with out-of-range step count")
            }
        }
    }

    drafts
}
