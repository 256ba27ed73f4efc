// 🔁 Batch Runner - many variables, grouped by normalization base
// Variables are requested either as explicit lists or as patterns over the
// scales' columns, each group keyed by an optional base variable. Excluded
// names are skipped with a warning; everything else that fails is fatal.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{CategorizeError, Result};
use crate::reconciler::{ResultTable, ScaleReconciler};
use crate::registry::{compile_patterns, VariableRegistry};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use tracing::info;

// ============================================================================
// SELECTIONS
// ============================================================================

/// Explicit variables normalized against `base` (raw values when `None`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSelection {
    #[serde(default, deserialize_with = "base_or_none")]
    pub base: Option<String>,
    pub variables: Vec<String>,
}

/// Every column matching `pattern` in any requested scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSelection {
    #[serde(default, deserialize_with = "base_or_none")]
    pub base: Option<String>,
    pub pattern: String,
}

/// Both kinds of request for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariablePlan {
    pub by_list: Vec<ListSelection>,
    pub by_regex: Vec<PatternSelection>,
}

impl VariablePlan {
    pub fn is_empty(&self) -> bool {
        self.by_list.is_empty() && self.by_regex.is_empty()
    }
}

/// Result of one base-variable group
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    pub base: Option<String>,
    pub table: ResultTable,
}

// A literal "None" base is read as no base, as older configs spell it
fn base_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let base: Option<String> = Option::deserialize(deserializer)?;
    Ok(base.filter(|b| b != "None" && !b.is_empty()))
}

// ============================================================================
// BATCH RUNNER
// ============================================================================

pub struct BatchRunner<'a> {
    reconciler: ScaleReconciler<'a>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(registry: &'a VariableRegistry) -> Self {
        BatchRunner {
            reconciler: ScaleReconciler::new(registry),
        }
    }

    fn registry(&self) -> &VariableRegistry {
        self.reconciler.registry()
    }

    /// Process explicit variable lists, one output per selection
    pub fn process_many(
        &self,
        scales: &[&str],
        selections: &[ListSelection],
        q: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<BatchOutput>> {
        self.validate(scales, selections.is_empty(), q)?;

        let mut outputs = Vec::with_capacity(selections.len());
        for selection in selections {
            if self.skip_base(selection.base.as_deref(), diagnostics) {
                continue;
            }
            let table =
                self.process_group(scales, &selection.variables, selection.base.as_deref(), q, diagnostics)?;
            outputs.push(BatchOutput {
                base: selection.base.clone(),
                table,
            });
        }
        Ok(outputs)
    }

    /// Process pattern selections; matches are unioned across scales and sorted
    pub fn process_many_regex(
        &self,
        scales: &[&str],
        selections: &[PatternSelection],
        q: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<BatchOutput>> {
        self.validate(scales, selections.is_empty(), q)?;

        let mut outputs = Vec::with_capacity(selections.len());
        for selection in selections {
            if self.skip_base(selection.base.as_deref(), diagnostics) {
                continue;
            }

            let pattern = compile_patterns(std::slice::from_ref(&selection.pattern))?.remove(0);
            let mut matched = BTreeSet::new();
            for scale in scales {
                let data = self.registry().scale(scale)?;
                matched.extend(
                    data.columns()
                        .iter()
                        .filter(|c| pattern.is_match(c))
                        .cloned(),
                );
            }
            if matched.is_empty() {
                diagnostics.push(WarningKind::PatternMatchedNothing {
                    pattern: selection.pattern.clone(),
                });
            }

            let variables: Vec<String> = matched.into_iter().collect();
            let table =
                self.process_group(scales, &variables, selection.base.as_deref(), q, diagnostics)?;
            outputs.push(BatchOutput {
                base: selection.base.clone(),
                table,
            });
        }
        Ok(outputs)
    }

    /// Full run: pattern selections first, then lists, merged and checked for duplicates
    pub fn run(
        &self,
        scales: &[&str],
        plan: &VariablePlan,
        q: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResultTable> {
        if plan.is_empty() {
            return Err(CategorizeError::InvalidArgument(
                "No variables requested: provide list or pattern selections".to_string(),
            ));
        }

        let mut outputs = Vec::new();
        if !plan.by_regex.is_empty() {
            outputs.extend(self.process_many_regex(scales, &plan.by_regex, q, diagnostics)?);
        }
        if !plan.by_list.is_empty() {
            outputs.extend(self.process_many(scales, &plan.by_list, q, diagnostics)?);
        }

        let merged = merge(scales, outputs)?;
        report_duplicates(&merged, diagnostics);

        info!(
            rows = merged.len(),
            variables = merged.codes().len(),
            "batch finished"
        );
        Ok(merged)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn validate(&self, scales: &[&str], no_selections: bool, q: usize) -> Result<()> {
        if no_selections {
            return Err(CategorizeError::InvalidArgument(
                "Selections must contain at least one base variable entry".to_string(),
            ));
        }
        if q < 1 {
            return Err(CategorizeError::invalid_q(q));
        }
        for scale in scales {
            self.registry().scale(scale)?;
        }
        Ok(())
    }

    fn skip_base(&self, base: Option<&str>, diagnostics: &mut Diagnostics) -> bool {
        match base {
            Some(base) if self.registry().is_excluded(base) => {
                diagnostics.push(WarningKind::ExcludedVariableSkipped {
                    variable: base.to_string(),
                });
                true
            }
            _ => false,
        }
    }

    fn process_group(
        &self,
        scales: &[&str],
        variables: &[String],
        base: Option<&str>,
        q: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResultTable> {
        let mut table = ResultTable::new(scales.iter().map(|s| s.to_string()).collect());
        for variable in variables {
            if self.registry().is_excluded(variable) {
                diagnostics.push(WarningKind::ExcludedVariableSkipped {
                    variable: variable.clone(),
                });
                continue;
            }
            let fragment = self
                .reconciler
                .process_variable(scales, variable, base, q, diagnostics)?;
            table.append(fragment)?;
        }
        Ok(table)
    }
}

/// Concatenate group outputs in order
pub fn merge(scales: &[&str], outputs: Vec<BatchOutput>) -> Result<ResultTable> {
    let mut merged = ResultTable::new(scales.iter().map(|s| s.to_string()).collect());
    for output in outputs {
        merged.append(output.table)?;
    }
    Ok(merged)
}

/// Warn about every repeated (code, bin); the table is left as is
pub fn report_duplicates(table: &ResultTable, diagnostics: &mut Diagnostics) -> Vec<(String, usize)> {
    let duplicates = table.duplicate_bins();
    for (code, bin) in &duplicates {
        diagnostics.push(WarningKind::DuplicateBin {
            code: code.clone(),
            bin: *bin,
        });
    }
    duplicates
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Scale, Translations};
    use crate::registry::RegistrySettings;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn registry(diagnostics: &mut Diagnostics) -> VariableRegistry {
        let norte = Scale::from_columns(
            "norte",
            vec![
                ("id", strings(&["n1", "n2", "n3", "n4"])),
                ("p_hombres", strings(&["1", "2", "3", "4"])),
                ("p_mujeres", strings(&["4", "3", "2", "1"])),
                ("pob", strings(&["10", "10", "20", "20"])),
                ("folio", strings(&["1", "2", "3", "4"])),
            ],
        )
        .unwrap();
        let sur = Scale::from_columns(
            "sur",
            vec![
                ("id", strings(&["s1", "s2"])),
                ("p_hombres", strings(&["5", "6"])),
                ("p_edad", strings(&["30", "40"])),
                ("pob", strings(&["10", "12"])),
            ],
        )
        .unwrap();

        let translations: Translations = vec![
            ("p_hombres", "Hombres"),
            ("p_mujeres", "Mujeres"),
            ("p_edad", "Edad"),
            ("pob", "Población"),
        ]
        .into_iter()
        .collect();

        VariableRegistry::new(
            vec![norte, sur],
            translations,
            RegistrySettings {
                identifier_columns: strings(&["id"]),
                excluded_variables: strings(&["folio"]),
                ..Default::default()
            },
            diagnostics,
        )
        .unwrap()
    }

    #[test]
    fn test_process_many_lists() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);
        let runner = BatchRunner::new(&registry);

        let outputs = runner
            .process_many(
                &["norte", "sur"],
                &[
                    ListSelection {
                        base: None,
                        variables: strings(&["p_hombres", "folio"]),
                    },
                    ListSelection {
                        base: Some("pob".to_string()),
                        variables: strings(&["p_mujeres"]),
                    },
                ],
                2,
                &mut diagnostics,
            )
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].base, None);
        assert_eq!(outputs[0].table.codes(), vec!["p_hombres"]);
        assert_eq!(outputs[1].base.as_deref(), Some("pob"));
        assert_eq!(outputs[1].table.codes(), vec!["p_mujeres"]);

        let skipped = diagnostics.filter(|k| {
            matches!(k, WarningKind::ExcludedVariableSkipped { variable } if variable == "folio")
        });
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn test_excluded_base_skips_group() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);
        let runner = BatchRunner::new(&registry);

        let outputs = runner
            .process_many(
                &["norte"],
                &[ListSelection {
                    base: Some("folio".to_string()),
                    variables: strings(&["p_hombres"]),
                }],
                2,
                &mut diagnostics,
            )
            .unwrap();

        assert!(outputs.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_regex_matches_sorted_and_unioned() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);
        let runner = BatchRunner::new(&registry);

        let outputs = runner
            .process_many_regex(
                &["norte", "sur"],
                &[
                    PatternSelection {
                        base: None,
                        pattern: "^p_".to_string(),
                    },
                    PatternSelection {
                        base: None,
                        pattern: "^zz".to_string(),
                    },
                ],
                2,
                &mut diagnostics,
            )
            .unwrap();

        assert_eq!(
            outputs[0].table.codes(),
            vec!["p_edad", "p_hombres", "p_mujeres"]
        );
        assert!(outputs[1].table.is_empty());

        let unmatched = diagnostics.filter(|k| matches!(k, WarningKind::PatternMatchedNothing { .. }));
        assert_eq!(unmatched.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);
        let runner = BatchRunner::new(&registry);

        let result = runner.process_many_regex(
            &["norte"],
            &[PatternSelection {
                base: None,
                pattern: "[".to_string(),
            }],
            2,
            &mut diagnostics,
        );
        assert!(matches!(result, Err(CategorizeError::Configuration(_))));
    }

    #[test]
    fn test_missing_everywhere_aborts() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);
        let runner = BatchRunner::new(&registry);

        // p_edad exists only in sur
        let result = runner.process_many(
            &["norte"],
            &[ListSelection {
                base: None,
                variables: strings(&["p_edad"]),
            }],
            2,
            &mut diagnostics,
        );
        assert!(matches!(result, Err(CategorizeError::VariableNotFound(_))));

        assert!(matches!(
            runner.process_many(&["norte"], &[], 2, &mut diagnostics),
            Err(CategorizeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_run_orders_regex_first_and_reports_duplicates() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);
        let runner = BatchRunner::new(&registry);

        let plan = VariablePlan {
            by_list: vec![ListSelection {
                base: None,
                variables: strings(&["p_hombres"]),
            }],
            by_regex: vec![PatternSelection {
                base: None,
                pattern: "^p_m".to_string(),
            }],
        };
        let table = runner
            .run(&["norte", "sur"], &plan, 2, &mut diagnostics)
            .unwrap();
        assert_eq!(table.codes(), vec!["p_mujeres", "p_hombres"]);
        assert!(table.duplicate_bins().is_empty());

        // Same variable through both paths: rows kept, duplicates reported
        let plan = VariablePlan {
            by_list: vec![ListSelection {
                base: None,
                variables: strings(&["p_mujeres"]),
            }],
            ..plan
        };
        let table = runner
            .run(&["norte", "sur"], &plan, 2, &mut diagnostics)
            .unwrap();
        let per_fragment = table.len() / 2;
        assert_eq!(table.duplicate_bins().len(), per_fragment);
        assert!(table.rows().iter().filter(|r| r.code == "p_mujeres" && r.bin == 1).count() == 2);

        let duplicates = diagnostics.filter(|k| matches!(k, WarningKind::DuplicateBin { .. }));
        assert_eq!(duplicates.len(), per_fragment);
    }

    #[test]
    fn test_none_base_spelling() {
        let selection: ListSelection =
            serde_json::from_str(r#"{"base": "None", "variables": ["x"]}"#).unwrap();
        assert_eq!(selection.base, None);

        let selection: PatternSelection = serde_json::from_str(r#"{"pattern": "^x"}"#).unwrap();
        assert_eq!(selection.base, None);

        let selection: PatternSelection =
            serde_json::from_str(r#"{"base": "pob", "pattern": "^x"}"#).unwrap();
        assert_eq!(selection.base.as_deref(), Some("pob"));
    }
}
