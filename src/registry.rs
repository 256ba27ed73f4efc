// 🗂️ Variable Registry - the working set of scales for one run
// Holds the scales, the translation dictionary and the identifier columns,
// and computes once which variables are excluded from categorization.

use crate::dataset::{Scale, Translations};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{CategorizeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

// ============================================================================
// SETTINGS
// ============================================================================

/// What to do with variables that have no entry in the translation dictionary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDictionaryPolicy {
    /// Add them to the excluded variables and warn
    #[default]
    Exclude,
    /// Refuse to build the registry
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrySettings {
    pub identifier_columns: Vec<String>,
    pub excluded_variables: Vec<String>,
    pub excluded_patterns: Vec<String>,
    pub missing_dictionary_policy: MissingDictionaryPolicy,
}

// ============================================================================
// VARIABLE REGISTRY
// ============================================================================

#[derive(Debug)]
pub struct VariableRegistry {
    scales: Vec<Scale>,
    translations: Translations,
    identifier_columns: Vec<String>,
    excluded: BTreeSet<String>,
    missing_dictionary: Vec<String>,
}

impl VariableRegistry {
    /// Validate the inputs and compute the excluded variables
    pub fn new(
        scales: Vec<Scale>,
        translations: Translations,
        settings: RegistrySettings,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for scale in &scales {
            if !seen.insert(scale.name()) {
                return Err(CategorizeError::Configuration(format!(
                    "Scale {} was supplied more than once",
                    scale.name()
                )));
            }
            for id in &settings.identifier_columns {
                if !scale.has_column(id) {
                    return Err(CategorizeError::Configuration(format!(
                        "Identifier column {} is missing from scale {}, it must exist in every scale",
                        id,
                        scale.name()
                    )));
                }
            }
        }

        let patterns = compile_patterns(&settings.excluded_patterns)?;

        let mut excluded: BTreeSet<String> = settings
            .excluded_variables
            .iter()
            .chain(settings.identifier_columns.iter())
            .cloned()
            .collect();

        // Patterns are resolved against each scale's columns, then unioned
        for pattern in &patterns {
            for scale in &scales {
                excluded.extend(
                    scale
                        .columns()
                        .iter()
                        .filter(|c| pattern.is_match(c))
                        .cloned(),
                );
            }
        }

        let missing: Vec<String> = scales
            .iter()
            .flat_map(|s| s.columns().iter())
            .filter(|c| !excluded.contains(*c) && !translations.contains(c))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !missing.is_empty() {
            match settings.missing_dictionary_policy {
                MissingDictionaryPolicy::Fail => {
                    return Err(CategorizeError::MissingDictionaryEntry(missing));
                }
                MissingDictionaryPolicy::Exclude => {
                    diagnostics.push(WarningKind::MissingDictionaryEntries {
                        variables: missing.clone(),
                    });
                    excluded.extend(missing.iter().cloned());
                }
            }
        }

        info!(
            scales = scales.len(),
            excluded = excluded.len(),
            "variable registry ready"
        );

        Ok(VariableRegistry {
            scales,
            translations,
            identifier_columns: settings.identifier_columns,
            excluded,
            missing_dictionary: missing,
        })
    }

    /// Excluded variables, sorted
    pub fn excluded_variables(&self) -> Vec<&str> {
        self.excluded.iter().map(String::as_str).collect()
    }

    /// Variables auto-excluded for lacking a dictionary entry, sorted
    pub fn missing_dictionary_variables(&self) -> &[String] {
        &self.missing_dictionary
    }

    pub fn is_excluded(&self, variable: &str) -> bool {
        self.excluded.contains(variable)
    }

    /// Every non-excluded column across all scales, sorted
    pub fn variables_considered(&self) -> Vec<&str> {
        self.scales
            .iter()
            .flat_map(|s| s.columns().iter())
            .filter(|c| !self.excluded.contains(*c))
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn scale(&self, name: &str) -> Result<&Scale> {
        self.scales
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| CategorizeError::UnknownScale(name.to_string()))
    }

    /// Scale names in the order they were supplied
    pub fn scale_names(&self) -> Vec<&str> {
        self.scales.iter().map(Scale::name).collect()
    }

    pub fn identifier_columns(&self) -> &[String] {
        &self.identifier_columns
    }

    pub fn display_name(&self, code: &str) -> Result<&str> {
        self.translations
            .get(code)
            .ok_or_else(|| CategorizeError::MissingDictionaryEntry(vec![code.to_string()]))
    }

    /// Fail unless the variable is usable: not excluded
    pub(crate) fn ensure_not_excluded(&self, variable: &str) -> Result<()> {
        if self.is_excluded(variable) {
            return Err(CategorizeError::ExcludedVariable(variable.to_string()));
        }
        Ok(())
    }
}

/// Compile selection/exclusion patterns, rejecting any that do not compile
pub(crate) fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                CategorizeError::Configuration(format!("Invalid regular expression {}: {}", p, e))
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
