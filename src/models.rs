//! Core data models used throughout txt2kb.
//!
//! These types represent the documents, extracted records, and pipeline
//! results that flow from discovery through masking, classification, and
//! extraction to the renderer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A plain-text document as discovered by a connector.
///
/// Immutable once read; the pipeline only ever borrows it.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the source root (e.g. `"incidents/2024-03-db.txt"`).
    pub source_id: String,
    /// Absolute path on disk, when the document came from the filesystem.
    pub path: Option<PathBuf>,
    /// Last modification time of the source file.
    pub discovered_at: DateTime<Utc>,
    pub body: String,
}

impl Document {
    /// Build an in-memory document stamped with the current time.
    pub fn new(source_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            path: None,
            discovered_at: Utc::now(),
            body: body.into(),
        }
    }

    /// Last path component of the source id.
    pub fn file_name(&self) -> &str {
        self.source_id
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.source_id)
    }

    /// File stem of the source id, used as a last-resort title.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name,
        }
    }

    /// Directory part of the source id (`""` for files at the root).
    pub fn storage_category(&self) -> &str {
        parent_dir(&self.source_id)
    }
}

fn parent_dir(source_id: &str) -> &str {
    match source_id.rfind(['/', '\\']) {
        Some(pos) => &source_id[..pos],
        None => "",
    }
}

/// The canonical structured output of the section extractor.
///
/// Every field is always present. An empty string means "no evidence
/// found" and is a meaningful value, not a missing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedRecord {
    pub title: String,
    pub summary_tldr: String,
    pub summary: String,
    pub root_cause: String,
    pub actions: String,
    pub prevention: String,
    pub tags: Vec<String>,
    pub category: Vec<String>,
}

impl ExtractedRecord {
    /// The four body sections in rendering order, paired with their field names.
    pub fn sections(&self) -> [(&'static str, &str); 4] {
        [
            ("summary", &self.summary),
            ("root_cause", &self.root_cause),
            ("actions", &self.actions),
            ("prevention", &self.prevention),
        ]
    }
}

/// Which extraction strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionPath {
    /// The LLM-assisted strategy succeeded.
    LlmAssisted,
    /// The rule-based strategy was selected up front.
    RuleBased,
    /// The LLM-assisted strategy failed twice and the rule-based one took over.
    RuleBasedFallback,
}

impl ExtractionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionPath::LlmAssisted => "llm-assisted",
            ExtractionPath::RuleBased => "rule-based",
            ExtractionPath::RuleBasedFallback => "rule-based-fallback",
        }
    }
}

impl fmt::Display for ExtractionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a record came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub extraction: ExtractionPath,
    /// LLM requests made for this document, failed ones included.
    pub llm_attempts: u32,
    /// Why the pipeline degraded to the fallback, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    /// Whether masking changed the input text.
    pub masking_altered: bool,
    pub masking_replacements: usize,
}

/// One document's finished pipeline output, handed to a renderer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub source_id: String,
    pub discovered_at: DateTime<Utc>,
    pub record: ExtractedRecord,
    pub provenance: Provenance,
    /// The masked document body; never the raw text.
    #[serde(skip)]
    pub masked_body: String,
}

impl PipelineResult {
    pub fn storage_category(&self) -> &str {
        parent_dir(&self.source_id)
    }
}
