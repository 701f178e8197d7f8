//! Per-document orchestration.
//!
//! ```text
//! Received → Masked → Classified ┐
//!                   → Extracted  ┴→ Merged → Done
//! ```
//!
//! Classification and extraction both read only the masked text and run
//! concurrently. Rule sets and the extractor are built once per run and
//! shared read-only, so one [`Pipeline`] serves every document of a batch.
//! A failure aborts only the document being processed.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::classify::{classify_document, merge_labels, LabelKind, TaggingRuleSet};
use crate::config::{load_masking_rules, load_tagging_rules, Config, ExtractionStrategy};
use crate::error::{ExtractionError, PipelineError};
use crate::extract::{ExtractionInput, Extractor, LlmExtractor, RuleBasedExtractor};
use crate::llm::create_client;
use crate::mask::{mask_document, Masked, MaskingLimits, MaskingRuleSet};
use crate::models::{Document, PipelineResult, Provenance};

/// Processing stages of one document, logged at `debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Masked,
    Classified,
    Extracted,
    Merged,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Masked => "masked",
            Stage::Classified => "classified",
            Stage::Extracted => "extracted",
            Stage::Merged => "merged",
            Stage::Done => "done",
        }
    }
}

fn enter(source_id: &str, stage: Stage) {
    tracing::debug!(source_id = %source_id, stage = stage.as_str(), "pipeline stage");
}

pub struct Pipeline {
    masking: Option<Arc<MaskingRuleSet>>,
    limits: MaskingLimits,
    tagging: Arc<TaggingRuleSet>,
    extractor: Arc<Extractor>,
}

impl Pipeline {
    /// `masking = None` disables masking entirely.
    pub fn new(
        masking: Option<MaskingRuleSet>,
        limits: MaskingLimits,
        tagging: TaggingRuleSet,
        extractor: Extractor,
    ) -> Self {
        Self {
            masking: masking.map(Arc::new),
            limits,
            tagging: Arc::new(tagging),
            extractor: Arc::new(extractor),
        }
    }

    /// Load rule files and build the extractor described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let masking = if config.masking.enabled {
            Some(load_masking_rules(&config.masking)?)
        } else {
            None
        };
        let tagging = load_tagging_rules(&config.tagging)?;

        let rule_based = RuleBasedExtractor::new(&config.extraction.section_signals)
            .context("Invalid extraction.section_signals")?;

        let extractor = match config.extraction.strategy {
            ExtractionStrategy::RuleBased => Extractor::rule_based(rule_based),
            ExtractionStrategy::Llm if !config.llm.is_enabled() => {
                tracing::warn!(
                    "extraction.strategy is 'llm' but llm.provider is 'disabled'; using rule-based extraction"
                );
                Extractor::rule_based(rule_based)
            }
            ExtractionStrategy::Llm => match create_client(&config.llm) {
                Ok(client) => {
                    let timeout = Duration::from_secs(config.llm.timeout_secs);
                    Extractor::with_fallback(Arc::new(LlmExtractor::new(client, timeout)), rule_based)
                        .min_input_chars(config.llm.min_input_chars)
                        .backfill_empty_sections(config.extraction.backfill_empty_sections)
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %config.llm.provider,
                        "LLM client unavailable ({e:#}); using rule-based extraction"
                    );
                    Extractor::rule_based(rule_based)
                }
            },
        };

        tracing::info!(
            masking_rules = masking.as_ref().map_or(0, |m| m.len()),
            tagging_rules = tagging.rules().len(),
            extraction = extractor.primary_name().unwrap_or("rule-based"),
            "pipeline ready"
        );

        Ok(Self::new(
            masking,
            MaskingLimits {
                max_document_bytes: config.masking.max_document_bytes,
            },
            tagging,
            extractor,
        ))
    }

    /// Run one document through every stage.
    pub async fn process(
        &self,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PipelineError> {
        let source_id = doc.source_id.as_str();
        enter(source_id, Stage::Received);
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(source_id.to_string()));
        }

        let masked = match &self.masking {
            Some(rules) => mask_document(doc, rules, &self.limits).map_err(|source| {
                PipelineError::MaskingFailure {
                    source_id: source_id.to_string(),
                    source,
                }
            })?,
            None => Masked::unchanged(doc.body.as_str()),
        };
        enter(source_id, Stage::Masked);

        let input = ExtractionInput {
            source_id,
            text: &masked.text,
            fallback_title: doc.stem(),
        };
        let classification = async {
            let c = classify_document(doc.file_name(), &masked.text, &self.tagging);
            enter(source_id, Stage::Classified);
            c
        };
        let (classification, extraction) =
            tokio::join!(classification, self.extractor.run(&input, cancel));

        let outcome = extraction.map_err(|e| match e {
            ExtractionError::Cancelled => PipelineError::Cancelled(source_id.to_string()),
            source => PipelineError::ExtractionTotalFailure {
                source_id: source_id.to_string(),
                source,
            },
        })?;
        enter(source_id, Stage::Extracted);

        let mut record = outcome.record;
        record.tags = merge_labels(
            &classification.tags,
            &record.tags,
            &self.tagging,
            LabelKind::Tag,
        );
        record.category = merge_labels(
            &classification.category,
            &record.category,
            &self.tagging,
            LabelKind::Category,
        );
        enter(source_id, Stage::Merged);

        let result = PipelineResult {
            source_id: doc.source_id.clone(),
            discovered_at: doc.discovered_at,
            record,
            provenance: Provenance {
                extraction: outcome.path,
                llm_attempts: outcome.llm_attempts,
                degraded_reason: outcome.degraded_reason,
                masking_altered: masked.altered(),
                masking_replacements: masked.replacements,
            },
            masked_body: masked.text,
        };
        enter(source_id, Stage::Done);
        Ok(result)
    }
}
