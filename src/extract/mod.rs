//! Section extraction: the [`SectionExtractor`] contract and the
//! fallback policy around it.
//!
//! Strategies are interchangeable implementations of one trait:
//!
//! - **[`RuleBasedExtractor`]**: heuristic, local, always available.
//! - **[`LlmExtractor`]**: asks a text-generation service for a JSON record
//!   and validates it strictly.
//!
//! [`Extractor`] wraps a primary strategy and the rule-based one. Any
//! recoverable failure of the primary degrades to rule-based extraction and
//! is reported through [`ExtractionOutcome::path`]; it never surfaces as an
//! error. Only cancellation and a rule-based failure (blank input) do.

pub mod llm;
pub mod prompt;
pub mod rule_based;
pub mod schema;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use llm::LlmExtractor;
pub use rule_based::{RuleBasedExtractor, SectionSignalSpec};

use crate::error::ExtractionError;
use crate::models::{ExtractedRecord, ExtractionPath};

/// What an extractor reads: the masked text and where it came from.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub source_id: &'a str,
    /// Masked document text.
    pub text: &'a str,
    /// Title used when the text offers none (the file stem).
    pub fallback_title: &'a str,
}

/// A strategy producing an [`ExtractedRecord`] from masked text.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use txt2kb::error::ExtractionError;
/// use txt2kb::extract::{ExtractionInput, SectionExtractor};
/// use txt2kb::models::ExtractedRecord;
///
/// pub struct TitleOnly;
///
/// #[async_trait]
/// impl SectionExtractor for TitleOnly {
///     fn name(&self) -> &str { "title-only" }
///
///     async fn extract(
///         &self,
///         input: &ExtractionInput<'_>,
///         _cancel: &CancellationToken,
///     ) -> Result<ExtractedRecord, ExtractionError> {
///         Ok(ExtractedRecord { title: input.fallback_title.to_string(), ..Default::default() })
///     }
/// }
/// ```
#[async_trait]
pub trait SectionExtractor: Send + Sync {
    /// Strategy name used in logs (e.g. `"rule-based"`).
    fn name(&self) -> &str;

    /// Extract a complete record, or fail with an [`ExtractionError`].
    ///
    /// Implementations that perform I/O must honour `cancel`.
    async fn extract(
        &self,
        input: &ExtractionInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedRecord, ExtractionError>;

    /// Like [`extract`](Self::extract), also reporting how many remote
    /// attempts were made. Local strategies make none.
    async fn extract_with_attempts(
        &self,
        input: &ExtractionInput<'_>,
        cancel: &CancellationToken,
    ) -> (Result<ExtractedRecord, ExtractionError>, u32) {
        (self.extract(input, cancel).await, 0)
    }
}

/// A record plus how it was produced.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub record: ExtractedRecord,
    pub path: ExtractionPath,
    /// Remote attempts made, including failed ones.
    pub llm_attempts: u32,
    pub degraded_reason: Option<String>,
}

/// Primary strategy with rule-based fallback.
pub struct Extractor {
    primary: Option<Arc<dyn SectionExtractor>>,
    rule_based: RuleBasedExtractor,
    min_input_chars: usize,
    backfill_empty_sections: bool,
}

impl Extractor {
    /// Rule-based extraction only.
    pub fn rule_based(rule_based: RuleBasedExtractor) -> Self {
        Self {
            primary: None,
            rule_based,
            min_input_chars: 0,
            backfill_empty_sections: false,
        }
    }

    /// `primary` first, rule-based on failure.
    pub fn with_fallback(primary: Arc<dyn SectionExtractor>, rule_based: RuleBasedExtractor) -> Self {
        Self {
            primary: Some(primary),
            rule_based,
            min_input_chars: 0,
            backfill_empty_sections: false,
        }
    }

    /// Texts shorter than this skip the primary strategy.
    pub fn min_input_chars(mut self, chars: usize) -> Self {
        self.min_input_chars = chars;
        self
    }

    /// Fill empty primary sections from the rule-based result.
    pub fn backfill_empty_sections(mut self, enabled: bool) -> Self {
        self.backfill_empty_sections = enabled;
        self
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary.as_deref().map(|p| p.name())
    }

    /// Run the policy. Errors are limited to [`ExtractionError::Cancelled`]
    /// and failures of the rule-based strategy itself.
    pub async fn run(
        &self,
        input: &ExtractionInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let Some(primary) = &self.primary else {
            return self.rule_based_outcome(input, ExtractionPath::RuleBased, 0, None);
        };

        if input.text.chars().count() < self.min_input_chars {
            tracing::debug!(
                source_id = %input.source_id,
                min_input_chars = self.min_input_chars,
                "input below LLM threshold, using rule-based extraction"
            );
            return self.rule_based_outcome(input, ExtractionPath::RuleBased, 0, None);
        }

        let (result, llm_attempts) = primary.extract_with_attempts(input, cancel).await;
        match result {
            Ok(mut record) => {
                if record.title.is_empty() {
                    record.title = rule_based::infer_title(input.text, input.fallback_title);
                }
                if self.backfill_empty_sections {
                    self.backfill(&mut record, input);
                }
                Ok(ExtractionOutcome {
                    record,
                    path: ExtractionPath::LlmAssisted,
                    llm_attempts,
                    degraded_reason: None,
                })
            }
            Err(ExtractionError::Cancelled) => Err(ExtractionError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    source_id = %input.source_id,
                    strategy = %primary.name(),
                    error = %e,
                    "falling back to rule-based extraction"
                );
                self.rule_based_outcome(
                    input,
                    ExtractionPath::RuleBasedFallback,
                    llm_attempts,
                    Some(e.to_string()),
                )
            }
        }
    }

    fn rule_based_outcome(
        &self,
        input: &ExtractionInput<'_>,
        path: ExtractionPath,
        llm_attempts: u32,
        degraded_reason: Option<String>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let record = self.rule_based.extract_sync(input)?;
        Ok(ExtractionOutcome {
            record,
            path,
            llm_attempts,
            degraded_reason,
        })
    }

    fn backfill(&self, record: &mut ExtractedRecord, input: &ExtractionInput<'_>) {
        let Ok(fallback) = self.rule_based.extract_sync(input) else {
            return;
        };
        let pairs = [
            (&mut record.summary_tldr, fallback.summary_tldr),
            (&mut record.summary, fallback.summary),
            (&mut record.root_cause, fallback.root_cause),
            (&mut record.actions, fallback.actions),
            (&mut record.prevention, fallback.prevention),
        ];
        for (field, value) in pairs {
            if field.is_empty() {
                *field = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::llm::testing::{record_json, ScriptedClient, Step};
    use super::*;
    use std::time::Duration;

    const TEXT: &str = "DHCP lease storm at HQ\n\n\
Clients at HQ could not obtain addresses for twenty minutes this morning.\n\n\
$ sudo systemctl restart dhcpd\nRestarted dhcpd and applied the shorter lease setting.";

    fn input() -> ExtractionInput<'static> {
        ExtractionInput {
            source_id: "net/lease.txt",
            text: TEXT,
            fallback_title: "lease",
        }
    }

    fn llm_extractor(steps: Vec<Step>, timeout_ms: u64) -> (Extractor, Arc<ScriptedClient>) {
        let client = ScriptedClient::new(steps);
        let primary = LlmExtractor::new(client.clone(), Duration::from_millis(timeout_ms));
        (
            Extractor::with_fallback(Arc::new(primary), RuleBasedExtractor::default()),
            client,
        )
    }

    #[tokio::test]
    async fn test_rule_based_only() {
        let ex = Extractor::rule_based(RuleBasedExtractor::default());
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.path, ExtractionPath::RuleBased);
        assert_eq!(out.record.title, "DHCP lease storm at HQ");
        assert!(out.degraded_reason.is_none());
    }

    #[tokio::test]
    async fn test_llm_success_path() {
        let (ex, _) = llm_extractor(vec![Step::Respond(record_json(&["DHCP", "lease", "HQ"]))], 1000);
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.path, ExtractionPath::LlmAssisted);
        assert_eq!(out.record.actions, "");
    }

    #[tokio::test]
    async fn test_two_malformed_responses_fall_back() {
        let (ex, client) = llm_extractor(
            vec![Step::Respond("{broken".into()), Step::Respond("still broken".into())],
            1000,
        );
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.path, ExtractionPath::RuleBasedFallback);
        assert!(out.degraded_reason.is_some());
        assert_eq!(client.calls(), 2);
        assert_eq!(out.llm_attempts, 2);
        assert_eq!(out.record.title, "DHCP lease storm at HQ");
    }

    #[tokio::test]
    async fn test_two_timeouts_fall_back() {
        let (ex, _) = llm_extractor(vec![Step::Hang, Step::Hang], 30);
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.path, ExtractionPath::RuleBasedFallback);
        assert!(out.degraded_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_short_input_skips_llm() {
        let (ex, client) = llm_extractor(vec![Step::Respond(record_json(&["a", "b", "c"]))], 1000);
        let ex = ex.min_input_chars(10_000);
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.path, ExtractionPath::RuleBased);
        assert_eq!(out.llm_attempts, 0);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_backfill_fills_empty_sections() {
        let (ex, _) = llm_extractor(vec![Step::Respond(record_json(&["a", "b", "c"]))], 1000);
        let ex = ex.backfill_empty_sections(true);
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.path, ExtractionPath::LlmAssisted);
        assert!(out.record.actions.contains("restart dhcpd"));
        assert_eq!(out.record.root_cause, "Lease time was set to 7 days.");
    }

    #[tokio::test]
    async fn test_empty_llm_title_is_inferred() {
        let json = record_json(&["a", "b", "c"]).replace("Lease storm at HQ", "");
        let (ex, _) = llm_extractor(vec![Step::Respond(json)], 1000);
        let out = ex.run(&input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.record.title, "DHCP lease storm at HQ");
    }

    #[tokio::test]
    async fn test_blank_text_is_total_failure() {
        let (ex, _) = llm_extractor(vec![Step::Fail, Step::Fail], 1000);
        let blank = ExtractionInput {
            source_id: "blank.txt",
            text: "   ",
            fallback_title: "blank",
        };
        let err = ex.run(&blank, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput));
    }
}
