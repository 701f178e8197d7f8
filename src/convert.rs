//! Batch conversion.
//!
//! Coordinates the full flow for a source directory: scan → pipeline →
//! render → write. Documents are processed concurrently, bounded by
//! `run.concurrency`. A document that fails is logged and counted; it never
//! stops the batch. Cancellation stops in-flight LLM calls and skips every
//! document not yet started.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, OutputFormat};
use crate::connector_fs;
use crate::error::PipelineError;
use crate::models::{Document, ExtractionPath};
use crate::pipeline::Pipeline;
use crate::render;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub src: PathBuf,
    pub out: PathBuf,
    pub dry_run: bool,
    pub format: OutputFormat,
    pub limit: Option<usize>,
}

/// Per-run counters, printed as the batch summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertReport {
    pub found: usize,
    pub converted: usize,
    /// Converted documents whose LLM extraction degraded to rule-based.
    pub fallback: usize,
    /// Blank documents.
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

enum DocOutcome {
    Converted { path: ExtractionPath },
    Failed,
    Cancelled,
}

pub async fn run_convert(
    config: &Config,
    options: &ConvertOptions,
    cancel: CancellationToken,
) -> Result<ConvertReport> {
    let mut docs = connector_fs::scan_documents(&options.src, &config.connector)?;
    if let Some(lim) = options.limit {
        docs.truncate(lim);
    }

    let mut report = ConvertReport {
        found: docs.len(),
        ..Default::default()
    };
    docs.retain(|doc| {
        let blank = doc.body.trim().is_empty();
        if blank {
            tracing::debug!(source_id = %doc.source_id, "skipping blank document");
            report.skipped += 1;
        }
        !blank
    });

    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let semaphore = Arc::new(Semaphore::new(config.run.concurrency));
    let mut tasks = JoinSet::new();

    for doc in docs {
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let dest = destination(&options.out, &doc, options.format);
        let dry_run = options.dry_run;
        let format = options.format;

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return DocOutcome::Cancelled;
            };
            if cancel.is_cancelled() {
                return DocOutcome::Cancelled;
            }
            convert_one(&pipeline, &doc, &dest, format, dry_run, &cancel).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined.context("conversion task panicked")? {
            DocOutcome::Converted { path } => {
                report.converted += 1;
                if path == ExtractionPath::RuleBasedFallback {
                    report.fallback += 1;
                }
            }
            DocOutcome::Failed => report.failed += 1,
            DocOutcome::Cancelled => report.cancelled += 1,
        }
    }

    tracing::info!(
        found = report.found,
        converted = report.converted,
        fallback = report.fallback,
        failed = report.failed,
        "conversion finished"
    );

    println!(
        "convert {} -> {}{}",
        options.src.display(),
        options.out.display(),
        if options.dry_run { " (dry-run)" } else { "" }
    );
    println!("  found: {}", report.found);
    println!("  converted: {}", report.converted);
    println!("  fallback: {}", report.fallback);
    println!("  skipped: {}", report.skipped);
    println!("  failed: {}", report.failed);
    if report.cancelled > 0 {
        println!("  cancelled: {}", report.cancelled);
    }
    println!("ok");

    Ok(report)
}

async fn convert_one(
    pipeline: &Pipeline,
    doc: &Document,
    dest: &Path,
    format: OutputFormat,
    dry_run: bool,
    cancel: &CancellationToken,
) -> DocOutcome {
    let result = match pipeline.process(doc, cancel).await {
        Ok(result) => result,
        Err(PipelineError::Cancelled(_)) => return DocOutcome::Cancelled,
        Err(e) => {
            tracing::warn!(source_id = %doc.source_id, error = %e, "document failed");
            return DocOutcome::Failed;
        }
    };
    let path = result.provenance.extraction;

    if dry_run {
        println!("[DRY] {} -> {}", doc.source_id, dest.display());
        return DocOutcome::Converted { path };
    }

    match write_output(&result, dest, format).await {
        Ok(()) => DocOutcome::Converted { path },
        Err(e) => {
            tracing::warn!(source_id = %doc.source_id, error = %format!("{e:#}"), "failed to write output");
            DocOutcome::Failed
        }
    }
}

async fn write_output(
    result: &crate::models::PipelineResult,
    dest: &Path,
    format: OutputFormat,
) -> Result<()> {
    let rendered = render::render(result, format)?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(dest, rendered)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(())
}

/// `out/<source_id>` with the extension of the output format.
fn destination(out: &Path, doc: &Document, format: OutputFormat) -> PathBuf {
    out.join(&doc.source_id).with_extension(format.extension())
}
