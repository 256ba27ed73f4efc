// 📋 Diagnostics - structured, non-fatal warnings collected during a run
// Each warning is logged through tracing as it is recorded and kept so the
// caller can inspect or report it afterwards.

use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// WARNING KINDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// Variables present in the scales but absent from the translation dictionary
    MissingDictionaryEntries { variables: Vec<String> },

    /// Base variable had zero values, treated as missing for the ratio
    ZeroBaseValues {
        scale: String,
        base_variable: String,
        count: usize,
    },

    /// A requested scale does not carry a variable other scales have
    VariableMissingInScale { scale: String, variable: String },

    /// A selection pattern matched no column in any requested scale
    PatternMatchedNothing { pattern: String },

    /// Batch request named an excluded variable (or base variable)
    ExcludedVariableSkipped { variable: String },

    /// The merged result holds the same (code, bin) more than once
    DuplicateBin { code: String, bin: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(flatten)]
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind) -> Self {
        let message = match &kind {
            WarningKind::MissingDictionaryEntries { variables } => format!(
                "Variables not present in the translation dictionary were excluded: {}",
                variables.join(", ")
            ),
            WarningKind::ZeroBaseValues {
                scale,
                base_variable,
                count,
            } => format!(
                "Base variable {} has {} zero value(s) in scale {}, treated as missing",
                base_variable, count, scale
            ),
            WarningKind::VariableMissingInScale { scale, variable } => {
                format!("Variable {} does not exist in scale {}", variable, scale)
            }
            WarningKind::PatternMatchedNothing { pattern } => {
                format!("Pattern {} does not match any variable", pattern)
            }
            WarningKind::ExcludedVariableSkipped { variable } => {
                format!("Variable {} is excluded, skipping", variable)
            }
            WarningKind::DuplicateBin { code, bin } => {
                format!("Duplicate category in result: code {} bin {}", code, bin)
            }
        };

        Warning { kind, message }
    }
}

// ============================================================================
// COLLECTOR
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it through the log
    pub fn push(&mut self, kind: WarningKind) {
        let warning = Warning::new(kind);
        warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Warnings matching a predicate on their kind
    pub fn filter<F>(&self, predicate: F) -> Vec<&Warning>
    where
        F: Fn(&WarningKind) -> bool,
    {
        self.warnings.iter().filter(|w| predicate(&w.kind)).collect()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

// ============================================================================
// TESTS
// ============================================================================
