//! Single-file commands: `mask`, `classify` and `extract`.
//!
//! Each reads one file, runs the pipeline up to the requested stage and
//! prints the outcome. Output goes to stdout; counts and diagnostics go to
//! stderr so the printed text can be piped.

use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::classify::classify_document;
use crate::config::{load_masking_rules, load_tagging_rules, Config};
use crate::connector_fs;
use crate::mask::{mask_document, Masked, MaskingLimits};
use crate::models::Document;
use crate::pipeline::Pipeline;
use crate::render;

fn masked_text(config: &Config, doc: &Document) -> Result<Masked> {
    if !config.masking.enabled {
        return Ok(Masked::unchanged(doc.body.as_str()));
    }
    let rules = load_masking_rules(&config.masking)?;
    let limits = MaskingLimits {
        max_document_bytes: config.masking.max_document_bytes,
    };
    mask_document(doc, &rules, &limits).with_context(|| format!("Cannot mask {}", doc.source_id))
}

pub fn run_mask(config: &Config, path: &Path) -> Result<()> {
    let doc = connector_fs::read_file(path)?;
    let masked = masked_text(config, &doc)?;
    print!("{}", masked.text);
    if !masked.text.ends_with('\n') {
        println!();
    }
    eprintln!("replacements: {}", masked.replacements);
    Ok(())
}

pub fn run_classify(config: &Config, path: &Path) -> Result<()> {
    let doc = connector_fs::read_file(path)?;
    let masked = masked_text(config, &doc)?;
    let tagging = load_tagging_rules(&config.tagging)?;
    let result = classify_document(doc.file_name(), &masked.text, &tagging);

    println!("tags: {}", result.tags.join(", "));
    println!("category: {}", result.category.join(", "));
    if result.is_empty() {
        eprintln!("no tagging rule matched");
    }
    Ok(())
}

pub async fn run_extract(config: &Config, path: &Path, cancel: CancellationToken) -> Result<()> {
    let doc = connector_fs::read_file(path)?;
    let pipeline = Pipeline::from_config(config)?;
    let result = pipeline.process(&doc, &cancel).await?;
    println!("{}", render::render_json(&result)?);
    Ok(())
}
