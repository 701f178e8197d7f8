//! LLM-assisted section extraction.
//!
//! One attempt = one request bounded by the configured timeout, raced
//! against the batch cancellation signal, followed by strict schema
//! validation. A recoverable failure (unparseable output, schema
//! violation, transport error, timeout) earns exactly one retry with a
//! stricter "JSON only" instruction. After that the error is returned and
//! the caller falls back to the rule-based strategy.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{prompt, schema, ExtractionInput, SectionExtractor};

use crate::error::ExtractionError;
use crate::llm::LlmClient;
use crate::models::ExtractedRecord;

/// Initial attempt plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    async fn attempt(
        &self,
        attempt: u32,
        input: &ExtractionInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedRecord, ExtractionError> {
        let instruction = prompt::instruction_for_attempt(attempt);
        let document = prompt::document_message(input.text);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.client.complete(&instruction, &document)) => {
                match res {
                    Err(_) => return Err(ExtractionError::Timeout(self.timeout)),
                    Ok(Err(e)) => return Err(ExtractionError::Transport(e.to_string())),
                    Ok(Ok(text)) => text,
                }
            }
        };

        schema::parse_record(&response)
    }
}

#[async_trait]
impl SectionExtractor for LlmExtractor {
    fn name(&self) -> &str {
        "llm-assisted"
    }

    async fn extract(
        &self,
        input: &ExtractionInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedRecord, ExtractionError> {
        self.extract_with_attempts(input, cancel).await.0
    }

    async fn extract_with_attempts(
        &self,
        input: &ExtractionInput<'_>,
        cancel: &CancellationToken,
    ) -> (Result<ExtractedRecord, ExtractionError>, u32) {
        let mut last_err = None;
        let mut attempts = 0;

        for attempt in 0..MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return (Err(ExtractionError::Cancelled), attempts);
            }
            attempts += 1;
            match self.attempt(attempt, input, cancel).await {
                Ok(record) => {
                    tracing::debug!(
                        source_id = %input.source_id,
                        attempt = attempts,
                        model = %self.model_name(),
                        "LLM extraction succeeded"
                    );
                    return (Ok(record), attempts);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        source_id = %input.source_id,
                        attempt = attempts,
                        error = %e,
                        "LLM extraction attempt failed"
                    );
                    last_err = Some(e);
                }
                Err(e) => return (Err(e), attempts),
            }
        }

        let err = last_err.unwrap_or_else(|| {
            ExtractionError::Transport("all extraction attempts exhausted".into())
        });
        (Err(err), attempts)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`LlmClient`] double shared by the extractor and pipeline tests.

    use super::*;
    use crate::llm::LlmError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub enum Step {
        Respond(String),
        Hang,
        Fail,
    }

    pub struct ScriptedClient {
        steps: Mutex<VecDeque<Step>>,
        pub instructions: Mutex<Vec<String>>,
        pub documents: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                instructions: Mutex::new(Vec::new()),
                documents: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.instructions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, instruction: &str, document: &str) -> Result<String, LlmError> {
            self.instructions
                .lock()
                .unwrap()
                .push(instruction.to_string());
            self.documents.lock().unwrap().push(document.to_string());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Respond(text)) => Ok(text),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
                Some(Step::Fail) | None => Err(LlmError::InvalidResponse("scripted failure".into())),
            }
        }
    }

    pub fn record_json(tags: &[&str]) -> String {
        serde_json::json!({
            "title": "Lease storm at HQ",
            "summary_tldr": "DHCP pool exhausted.",
            "summary": "Clients at HQ could not obtain leases for 20 minutes.",
            "root_cause": "Lease time was set to 7 days.",
            "actions": "",
            "prevention": "",
            "tags": tags,
            "category": ["Network", "Incident", "DHCP"]
        })
        .to_string()
    }
}
