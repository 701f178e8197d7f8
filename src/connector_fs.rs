use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::ConnectorConfig;
use crate::models::Document;

/// Walk `root` and read every file matching the include globs.
///
/// Source ids are `/`-separated paths relative to `root`; results are
/// sorted by source id. Files that are not valid UTF-8 are decoded lossily.
pub fn scan_documents(root: &Path, config: &ConnectorConfig) -> Result<Vec<Document>> {
    if !root.is_dir() {
        bail!("Source directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/.*".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        docs.push(read_document(path, &rel_str)?);
    }

    docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    tracing::debug!(root = %root.display(), documents = docs.len(), "scan complete");

    Ok(docs)
}

/// Read a single file as a document whose source id is its file name.
pub fn read_file(path: &Path) -> Result<Document> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    read_document(path, &name)
}

fn read_document(path: &Path, source_id: &str) -> Result<Document> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = String::from_utf8_lossy(&bytes).into_owned();

    Ok(Document {
        source_id: source_id.to_string(),
        path: Some(path.to_path_buf()),
        discovered_at: DateTime::<Utc>::from(modified),
        body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
