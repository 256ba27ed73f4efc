// Scale Categorizer - batch CLI
// `process` runs a configured categorization, `load` pushes a result file into SQLite.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scale_categorizer::{db, execute, RunConfig, RunReport};

/// Quantile categories of census variables, reconciled across geographic scales
#[derive(Parser, Debug)]
#[command(name = "scale-categorizer", version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the categorization described by a JSON config
    Process {
        /// Path to the run config
        #[arg(long)]
        config: PathBuf,

        /// Also write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load a result file into a SQLite table
    Load {
        /// Result file written by `process`
        #[arg(long)]
        input: PathBuf,

        /// SQLite database file (created if missing)
        #[arg(long, env = "SCALE_CATEGORIZER_DB")]
        database: PathBuf,

        /// Target table name
        #[arg(long)]
        table: String,

        /// Create the table if it does not exist
        #[arg(long)]
        create_table: bool,

        /// Field delimiter of the result file
        #[arg(long, default_value = ",")]
        delimiter: char,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Process { config, report } => run_process(config, report),
        Commands::Load {
            input,
            database,
            table,
            create_table,
            delimiter,
        } => run_load(input, database, table, create_table, delimiter),
    }
}

fn run_process(config_path: PathBuf, report_path: Option<PathBuf>) -> Result<()> {
    println!("📊 Scale Categorizer v{}", scale_categorizer::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n⚙️  Loading config {}...", config_path.display());
    let config = RunConfig::from_file(&config_path)?;
    println!(
        "✓ {} scale(s), q = {}, {} list + {} pattern selection(s)",
        config.scales.len(),
        config.q,
        config.variables_by_list.len(),
        config.variables_by_regex.len()
    );

    println!("\n🔢 Categorizing...");
    let outcome = execute(&config)?;
    println!("✓ {} variable(s) excluded", outcome.excluded_variables.len());

    let report = RunReport::new(
        &outcome.table,
        &config.output_path,
        outcome.diagnostics.into_warnings(),
    );
    if let Some(path) = report_path {
        report.write(&path)?;
        println!("✓ Run report written to {}", path.display());
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {}", report.summary());
    if !report.warnings.is_empty() {
        println!("⚠️  Warnings:");
        for warning in &report.warnings {
            println!("   - {}", warning.message);
        }
    }

    Ok(())
}

fn run_load(
    input: PathBuf,
    database: PathBuf,
    table: String,
    create_table: bool,
    delimiter: char,
) -> Result<()> {
    if !delimiter.is_ascii() {
        bail!("Delimiter {:?} must be a single ASCII character", delimiter);
    }

    println!("🗄️  Loading {} into {}", input.display(), database.display());
    let mut conn = db::open_database(&database)?;
    let inserted = db::load_result_table(&mut conn, &input, &table, create_table, delimiter as u8)?;
    let total = db::count_rows(&conn, &table)?;

    println!("✓ Inserted {} row(s); {} now holds {}", inserted, table, total);
    Ok(())
}
