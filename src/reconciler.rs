// 🧮 Scale Reconciler - one variable, categorized across every scale
// Each scale is binned independently. Row i of the result is bin i in
// every scale, so scales with fewer bins leave the later rows empty.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{CategorizeError, Result};
use crate::quantile::{categorize, Bin};
use crate::registry::VariableRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

// ============================================================================
// RESULT TABLE
// ============================================================================

/// One scale's content for a bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleBin {
    pub interval: String,
    pub cells: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinRow {
    pub name: String,
    pub code: String,
    /// 1-based bin index
    pub bin: usize,
    /// One entry per table scale, `None` when the scale has no such bin
    pub scales: Vec<Option<ScaleBin>>,
}

impl BinRow {
    pub fn is_empty(&self) -> bool {
        self.scales.iter().all(Option::is_none)
    }
}

/// Rows of (variable, bin) with per-scale interval/cells columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    scales: Vec<String>,
    rows: Vec<BinRow>,
}

impl ResultTable {
    pub fn new(scales: Vec<String>) -> Self {
        ResultTable {
            scales,
            rows: Vec::new(),
        }
    }

    pub fn scales(&self) -> &[String] {
        &self.scales
    }

    pub fn rows(&self) -> &[BinRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `name, code, bin`, then `interval_<scale>, cells_<scale>` per scale
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["name".to_string(), "code".to_string(), "bin".to_string()];
        for scale in &self.scales {
            headers.push(format!("interval_{}", scale));
            headers.push(format!("cells_{}", scale));
        }
        headers
    }

    /// One row flattened in header order, `None` for null cells
    pub fn record(row: &BinRow) -> Vec<Option<String>> {
        let mut record = vec![
            Some(row.name.clone()),
            Some(row.code.clone()),
            Some(row.bin.to_string()),
        ];
        for cell in &row.scales {
            record.push(cell.as_ref().map(|c| c.interval.clone()));
            record.push(cell.as_ref().map(|c| c.cells.clone()));
        }
        record
    }

    pub fn push(&mut self, row: BinRow) -> Result<()> {
        if row.scales.len() != self.scales.len() {
            return Err(CategorizeError::InvalidArgument(format!(
                "Row for {} has {} scale columns, table has {}",
                row.code,
                row.scales.len(),
                self.scales.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append another table's rows; both must cover the same scales
    pub fn append(&mut self, other: ResultTable) -> Result<()> {
        if other.scales != self.scales {
            return Err(CategorizeError::InvalidArgument(format!(
                "Cannot merge tables over scales [{}] and [{}]",
                self.scales.join(", "),
                other.scales.join(", ")
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Every (code, bin) that repeats an earlier row
    pub fn duplicate_bins(&self) -> Vec<(String, usize)> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| !seen.insert((r.code.as_str(), r.bin)))
            .map(|r| (r.code.clone(), r.bin))
            .collect()
    }

    /// Distinct variable codes in row order
    pub fn codes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|r| r.code.as_str())
            .filter(|code| seen.insert(*code))
            .collect()
    }
}

/// Render ids as an array literal: `{a,b,c}`, quote characters removed
pub fn array_literal<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cleaned: Vec<String> = items
        .into_iter()
        .map(|s| s.as_ref().replace(['\'', '"'], ""))
        .collect();
    format!("{{{}}}", cleaned.join(","))
}

// ============================================================================
// SCALE RECONCILER
// ============================================================================

pub struct ScaleReconciler<'a> {
    registry: &'a VariableRegistry,
}

/// Ordered bins of one scale with their members
struct ScaleBins<'a> {
    bins: Vec<(Bin, Vec<&'a String>)>,
}

impl<'a> ScaleReconciler<'a> {
    pub fn new(registry: &'a VariableRegistry) -> Self {
        ScaleReconciler { registry }
    }

    pub fn registry(&self) -> &VariableRegistry {
        self.registry
    }

    /// Categorize one variable in every requested scale, q + 1 rows at most
    pub fn process_variable(
        &self,
        scales: &[&str],
        variable: &str,
        base_variable: Option<&str>,
        q: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResultTable> {
        // ====================================================================
        // VALIDATION
        // ====================================================================
        if scales.is_empty() {
            return Err(CategorizeError::InvalidArgument(
                "At least one scale must be requested".to_string(),
            ));
        }
        let datasets = scales
            .iter()
            .map(|s| self.registry.scale(s))
            .collect::<Result<Vec<_>>>()?;

        self.registry.ensure_not_excluded(variable)?;
        if let Some(base) = base_variable {
            self.registry.ensure_not_excluded(base)?;
        }
        if q < 1 {
            return Err(CategorizeError::invalid_q(q));
        }

        let mut usable = Vec::with_capacity(datasets.len());
        let mut found_variable = false;
        let mut found_base = base_variable.is_none();
        for data in &datasets {
            let has_variable = data.has_column(variable);
            if has_variable {
                found_variable = true;
            } else {
                diagnostics.push(WarningKind::VariableMissingInScale {
                    scale: data.name().to_string(),
                    variable: variable.to_string(),
                });
            }

            let has_base = match base_variable {
                Some(base) if data.has_column(base) => {
                    found_base = true;
                    true
                }
                Some(base) => {
                    diagnostics.push(WarningKind::VariableMissingInScale {
                        scale: data.name().to_string(),
                        variable: base.to_string(),
                    });
                    false
                }
                None => true,
            };

            usable.push(has_variable && has_base);
        }

        if !found_variable {
            return Err(CategorizeError::VariableNotFound(variable.to_string()));
        }
        if !found_base {
            return Err(CategorizeError::VariableNotFound(
                base_variable.unwrap_or_default().to_string(),
            ));
        }

        let name = self.registry.display_name(variable)?.to_string();

        // ====================================================================
        // PER-SCALE CATEGORIZATION
        // ====================================================================
        let ids = datasets
            .iter()
            .zip(&usable)
            .map(|(data, &ok)| {
                if ok {
                    data.entity_ids(self.registry.identifier_columns())
                } else {
                    Ok(Vec::new())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut per_scale: Vec<Option<ScaleBins>> = Vec::with_capacity(datasets.len());
        for ((data, &ok), ids) in datasets.iter().zip(&usable).zip(&ids) {
            if !ok {
                per_scale.push(None);
                continue;
            }

            let categorization =
                categorize(self.registry, data.name(), variable, base_variable, q, diagnostics)?;
            let groups = categorization.group(ids);

            let mut bins: Vec<(Bin, Vec<&String>)> = categorization
                .bins()
                .iter()
                .copied()
                .zip(groups)
                .collect();
            bins.sort_by(|a, b| a.0.cmp(&b.0));

            debug!(
                scale = data.name(),
                variable,
                bins = bins.len(),
                "categorized"
            );
            per_scale.push(Some(ScaleBins { bins }));
        }

        // ====================================================================
        // ALIGNMENT
        // ====================================================================
        let as_percentage = base_variable.is_some();
        let mut table = ResultTable::new(scales.iter().map(|s| s.to_string()).collect());

        for i in 0..=q {
            let cells = per_scale
                .iter()
                .map(|scale_bins| {
                    let (bin, members) = scale_bins.as_ref()?.bins.get(i)?;
                    Some(ScaleBin {
                        interval: bin.label(as_percentage),
                        cells: array_literal(members.iter()),
                    })
                })
                .collect();

            let row = BinRow {
                name: name.clone(),
                code: variable.to_string(),
                bin: i + 1,
                scales: cells,
            };
            if !row.is_empty() {
                table.push(row)?;
            }
        }

        Ok(table)
    }
}

// ============================================================================
// TESTS
// ============================================================================
