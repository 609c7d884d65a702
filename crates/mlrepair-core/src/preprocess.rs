//! Canonical formatting of program directories before a run.

use std::path::{Path, PathBuf};

use model_syntax::canonical_form;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Sorted `*.py` files directly inside `dir`.
pub fn list_programs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "py") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_names(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatReport {
    pub formatted: usize,
    /// Files that failed to parse and were left out.
    pub failed: Vec<String>,
    /// The output directory already held every file.
    pub up_to_date: bool,
}

/// Write the canonical form of every program in `input_dir` to
/// `output_dir` under the same file name.
pub fn format_programs(input_dir: &Path, output_dir: &Path) -> Result<FormatReport> {
    let inputs = list_programs(input_dir)?;
    if output_dir.is_dir() && file_names(&inputs) == file_names(&list_programs(output_dir)?) {
        info!(event = "format.up_to_date", dir = %output_dir.display());
        return Ok(FormatReport {
            up_to_date: true,
            ..FormatReport::default()
        });
    }

    std::fs::create_dir_all(output_dir)?;
    let mut report = FormatReport::default();
    for input in &inputs {
        let Some(name) = input.file_name() else {
            continue;
        };
        let text = std::fs::read_to_string(input)?;
        match canonical_form(&text) {
            Ok(canonical) => {
                std::fs::write(output_dir.join(name), canonical)?;
                report.formatted += 1;
            }
            Err(err) => {
                warn!(event = "format.unparseable", file = %input.display(), error = %err);
                report.failed.push(name.to_string_lossy().into_owned());
            }
        }
    }
    info!(
        event = "format.finished",
        dir = %output_dir.display(),
        formatted = report.formatted,
        failed = report.failed.len(),
    );
    Ok(report)
}
