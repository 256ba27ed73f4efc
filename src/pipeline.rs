// 🔄 Pipeline - one configured run from files to result table
// config → scales + translations → registry → batch → output file

use crate::batch::BatchRunner;
use crate::config::RunConfig;
use crate::dataset::{Scale, Translations};
use crate::diagnostics::Diagnostics;
use crate::reconciler::ResultTable;
use crate::registry::VariableRegistry;
use crate::output::write_result_table;
use anyhow::{Context, Result};
use tracing::info;

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub table: ResultTable,
    pub diagnostics: Diagnostics,
    pub excluded_variables: Vec<String>,
}

/// Load every configured scale and the dictionary, then build the registry
pub fn load_registry(config: &RunConfig, diagnostics: &mut Diagnostics) -> Result<VariableRegistry> {
    let delimiter = config.delimiter_byte();

    let mut scales = Vec::with_capacity(config.scales.len());
    for source in &config.scales {
        let scale = Scale::from_csv(&source.name, &source.path, delimiter)?;
        info!(scale = %source.name, rows = scale.row_count(), "scale loaded");
        scales.push(scale);
    }

    let translations = Translations::from_csv(
        &config.translations.path,
        &config.translations.name_column,
        &config.translations.alias_column,
        delimiter,
    )?;
    info!(entries = translations.len(), "translations loaded");

    let registry =
        VariableRegistry::new(scales, translations, config.registry_settings(), diagnostics)
            .context("Failed to build variable registry")?;
    Ok(registry)
}

/// Run the configured batch and write the result table to `output_path`
pub fn execute(config: &RunConfig) -> Result<RunOutcome> {
    config.validate()?;

    let mut diagnostics = Diagnostics::new();
    let registry = load_registry(config, &mut diagnostics)?;

    let runner = BatchRunner::new(&registry);
    let table = runner
        .run(&config.scale_names(), &config.plan(), config.q, &mut diagnostics)
        .context("Categorization failed")?;

    write_result_table(&table, &config.output_path, config.delimiter_byte())?;

    Ok(RunOutcome {
        table,
        diagnostics,
        excluded_variables: registry
            .excluded_variables()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}
