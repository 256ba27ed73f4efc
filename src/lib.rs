// Scale Categorizer - Core Library
// Quantile binning of census variables across geographic scales.
// Exposes all modules for use in the CLI and tests.

pub mod error;
pub mod diagnostics;
pub mod dataset;
pub mod registry;     // Variable Registry - exclusions + display names
pub mod normalizer;   // Ratio against a base variable
pub mod quantile;     // Quantile bins + assignment
pub mod reconciler;   // Per-variable table across scales
pub mod batch;        // Many variables, list or pattern selections
pub mod config;
pub mod output;
pub mod pipeline;
pub mod db;           // SQLite loader for result tables

// Re-export commonly used types
pub use error::{CategorizeError, Result};
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use dataset::{Scale, Translations};
pub use registry::{MissingDictionaryPolicy, RegistrySettings, VariableRegistry};
pub use normalizer::normalize;
pub use quantile::{categorize, quantile_bins, Bin, Categorization, UNCLASSIFIED_LABEL};
pub use reconciler::{array_literal, BinRow, ResultTable, ScaleBin, ScaleReconciler};
pub use batch::{
    merge, report_duplicates, BatchOutput, BatchRunner, ListSelection, PatternSelection,
    VariablePlan,
};
pub use config::{RunConfig, ScaleSource, TranslationSource};
pub use output::{write_result_table, RunReport};
pub use pipeline::{execute, load_registry, RunOutcome};
pub use db::{
    count_rows, insert_result_table, insert_rows, load_result_table, open_database,
    setup_result_table,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
