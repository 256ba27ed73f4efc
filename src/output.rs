// 💾 Output - the flat result table and the run report

use crate::diagnostics::Warning;
use crate::reconciler::ResultTable;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write the table as a delimited file; null cells are written empty
pub fn write_result_table(table: &ResultTable, path: &Path, delimiter: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;

    wtr.write_record(table.headers())
        .context("Failed to write header")?;

    for row in table.rows() {
        let record: Vec<String> = ResultTable::record(row)
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        wtr.write_record(&record)
            .with_context(|| format!("Failed to write row {} bin {}", row.code, row.bin))?;
    }

    wtr.flush().context("Failed to flush output file")?;
    info!(rows = table.len(), path = %path.display(), "result table written");
    Ok(())
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub output_path: PathBuf,
    pub rows: usize,
    pub variables: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl RunReport {
    pub fn new(table: &ResultTable, output_path: &Path, warnings: Vec<Warning>) -> Self {
        RunReport {
            generated_at: Utc::now(),
            output_path: output_path.to_path_buf(),
            rows: table.len(),
            variables: table.codes().into_iter().map(String::from).collect(),
            warnings,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows for {} variables written to {}, {} warning(s)",
            self.rows,
            self.variables.len(),
            self.output_path.display(),
            self.warnings.len()
        )
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(path, json).with_context(|| format!("Failed to write run report: {:?}", path))
    }
}

// ============================================================================
// TESTS
// ============================================================================
