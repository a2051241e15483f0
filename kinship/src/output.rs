//! Dataset files: one JSON Lines file per split plus a `config.json`
//! manifest describing how they were made.

use crate::args::Cli;
use kinship_core::{pattern_counts, DatasetRow, TaskSpec};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// Errors from writing dataset files.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Test => f.write_str("test"),
        }
    }
}

/// `<task>_<split>.jsonl`, e.g. `1.3_train.jsonl`.
pub fn file_name(spec: &TaskSpec, split: Split) -> String {
    format!("{}_{}.jsonl", spec, split)
}

/// Summary of one written file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub rows: usize,
    pub patterns: BTreeMap<String, usize>,
}

/// Everything `config.json` records.
#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    pub seed: u64,
    pub args: &'a Cli,
    /// Task spec -> file name.
    pub train_task: BTreeMap<String, String>,
    pub test_tasks: BTreeMap<String, String>,
    /// File name -> summary.
    pub files: BTreeMap<String, FileSummary>,
}

/// Write `rows` as JSON Lines to `dir/name` and log what went in.
pub async fn write_rows(
    dir: impl AsRef<Path>,
    name: &str,
    rows: &[DatasetRow],
) -> Result<FileSummary, OutputError> {
    fs::create_dir_all(dir.as_ref()).await?;

    let mut content = String::new();
    for row in rows {
        content.push_str(&serde_json::to_string(row)?);
        content.push('\n');
    }
    let path = dir.as_ref().join(name);
    fs::write(&path, content).await?;

    let patterns = pattern_counts(rows);
    info!(
        file = %path.display(),
        rows = rows.len(),
        unique_patterns = patterns.len(),
        "wrote dataset file"
    );
    for (pattern, count) in &patterns {
        debug!(file = name, pattern = %pattern, count, "pattern count");
    }

    Ok(FileSummary {
        rows: rows.len(),
        patterns,
    })
}

/// Write `config.json` into `dir` and return its path.
pub async fn write_manifest(
    dir: impl AsRef<Path>,
    manifest: &Manifest<'_>,
) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(dir.as_ref()).await?;
    let path = dir.as_ref().join("config.json");
    let content = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, content).await?;
    Ok(path)
}
