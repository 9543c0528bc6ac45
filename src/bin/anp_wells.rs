use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use anp_wells::app::{Pipeline, ProgressSink, RecordFilter};
use anp_wells::config::ConfigLoader;
use anp_wells::domain::{Environment, ScanMode};
use anp_wells::error::AnpError;
use anp_wells::fetcher::AnpHttpClient;
use anp_wells::output::{JsonOutput, OutputMode, TextOutput, TracingSink};
use anp_wells::store::Store;

#[derive(Parser)]
#[command(name = "anp-wells")]
#[command(about = "Well-level oil and gas production data from the ANP open-data portal")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Path to an anp-wells.json config file.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override the cache directory (default: ~/.cache/anp-wells).
    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List source files found on the listing page")]
    Sources,
    #[command(about = "Build or show the per-environment field index")]
    Index(IndexArgs),
    #[command(about = "Load the consolidated dataset, rebuilding it when needed")]
    Dataset(DatasetArgs),
    #[command(about = "Print the canonical column set")]
    Schema,
    #[command(about = "Remove every cached artifact")]
    Clear,
}

#[derive(Args)]
struct IndexArgs {
    #[command(subcommand)]
    command: IndexCommand,
}

#[derive(Subcommand)]
enum IndexCommand {
    #[command(about = "Scan source files and merge their field names into the index")]
    Build {
        #[arg(value_enum)]
        environment: Environment,

        /// Scan every file instead of only the most recent ones.
        #[arg(long)]
        full: bool,
    },
    #[command(about = "Print the persisted field index")]
    Show {
        #[arg(value_enum)]
        environment: Environment,
    },
}

#[derive(Args)]
struct DatasetArgs {
    /// Ignore the cached dataset and raw files and download everything again.
    #[arg(long)]
    refresh: bool,

    /// Keep only records of this field (repeatable).
    #[arg(long = "field", value_name = "FIELD")]
    fields: Vec<String>,

    /// Keep only records of this well (repeatable).
    #[arg(long = "well", value_name = "WELL")]
    wells: Vec<String>,

    /// Print the records themselves instead of a summary.
    #[arg(long)]
    records: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(anp) = report.downcast_ref::<AnpError>() {
            return ExitCode::from(map_exit_code(anp));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AnpError) -> u8 {
    match error {
        AnpError::InvalidEnvironment(_) | AnpError::ConfigRead(_) | AnpError::ConfigParse(_) => 2,
        AnpError::Http(_) | AnpError::Status { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let store = match cli.cache_dir {
        Some(root) => Store::new_with_root(root),
        None => Store::new()?,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let client = AnpHttpClient::new(Duration::from_secs(config.timeout_secs))?;
    let pipeline = Pipeline::new(store, client, config);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &TracingSink,
    };

    match cli.command {
        Commands::Sources => {
            let discovery = pipeline.discover(sink);
            match output_mode {
                OutputMode::Json => JsonOutput::print_discovery(&discovery).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_discovery(&discovery),
            }
        }
        Commands::Index(args) => match args.command {
            IndexCommand::Build { environment, full } => {
                let mode = if full { ScanMode::Full } else { ScanMode::Quick };
                let result = pipeline.build_field_index(environment, mode, sink)?;
                match output_mode {
                    OutputMode::Json => JsonOutput::print_index(&result).into_diagnostic()?,
                    OutputMode::Text => TextOutput::print_index(&result),
                }
            }
            IndexCommand::Show { environment } => {
                let fields = pipeline.field_index(environment);
                match output_mode {
                    OutputMode::Json => JsonOutput::print_fields(&fields).into_diagnostic()?,
                    OutputMode::Text => TextOutput::print_fields(&fields),
                }
            }
        },
        Commands::Dataset(args) => {
            let result = pipeline.get_dataset(args.refresh, sink)?;
            let filter = RecordFilter::new(args.fields, args.wells);
            if args.records || !filter.is_empty() {
                let records = result.filtered(&filter);
                for diagnostic in &result.diagnostics {
                    tracing::warn!("{diagnostic}");
                }
                match output_mode {
                    OutputMode::Json => JsonOutput::print_records(&records).into_diagnostic()?,
                    OutputMode::Text => TextOutput::print_records(&records).into_diagnostic()?,
                }
            } else {
                let summary = result.summary();
                match output_mode {
                    OutputMode::Json => JsonOutput::print_dataset(&summary).into_diagnostic()?,
                    OutputMode::Text => TextOutput::print_dataset(&summary),
                }
            }
        }
        Commands::Schema => match output_mode {
            OutputMode::Json => JsonOutput::print_schema().into_diagnostic()?,
            OutputMode::Text => TextOutput::print_schema(),
        },
        Commands::Clear => {
            let result = pipeline.clear(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_clear(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_clear(&result),
            }
        }
    }
    Ok(())
}
