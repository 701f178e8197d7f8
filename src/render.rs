//! Default output renderers.
//!
//! Markdown output is a front-matter block followed by the record
//! sections; empty sections are left out and the masked source text is
//! appended in a fenced block. JSON output is the serialized
//! [`PipelineResult`] (record plus provenance, without the body).

use anyhow::Result;

use crate::config::OutputFormat;
use crate::models::PipelineResult;

/// Headings in [`ExtractedRecord::sections`] order.
///
/// [`ExtractedRecord::sections`]: crate::models::ExtractedRecord::sections
const SECTION_HEADINGS: [&str; 4] = ["## Summary", "## Root cause", "## Actions", "## Prevention"];

pub fn render(result: &PipelineResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => render_markdown(result),
        OutputFormat::Json => render_json(result),
    }
}

pub fn render_json(result: &PipelineResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn render_markdown(result: &PipelineResult) -> Result<String> {
    let record = &result.record;
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("title: {}\n", serde_json::to_string(&record.title)?));
    out.push_str(&format!("tags: {}\n", serde_json::to_string(&record.tags)?));
    out.push_str(&format!("category: {}\n", serde_json::to_string(&record.category)?));
    out.push_str(&format!("date: {}\n", result.discovered_at.format("%Y-%m-%d")));
    out.push_str(&format!("source_file: {}\n", serde_json::to_string(&result.source_id)?));
    out.push_str(&format!(
        "storage_category: {}\n",
        serde_json::to_string(result.storage_category())?
    ));
    out.push_str(&format!("extraction: {}\n", result.provenance.extraction));
    out.push_str(&format!("masked: {}\n", result.provenance.masking_altered));
    out.push_str("---\n\n");

    out.push_str(&format!("# {}\n\n", record.title));
    if !record.summary_tldr.is_empty() {
        out.push_str(&format!("> {}\n\n", record.summary_tldr));
    }

    for ((_, content), heading) in record.sections().iter().zip(SECTION_HEADINGS) {
        if content.trim().is_empty() {
            continue;
        }
        out.push_str(heading);
        out.push_str("\n\n");
        out.push_str(content.trim());
        out.push_str("\n\n");
    }

    let body = result.masked_body.trim();
    if !body.is_empty() {
        let fence = fence_for(body);
        out.push_str("## Source (masked)\n\n");
        out.push_str(&format!("{fence}text\n{body}\n{fence}\n"));
    }

    Ok(out)
}

/// A backtick fence longer than any run inside `body`.
fn fence_for(body: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in body.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
