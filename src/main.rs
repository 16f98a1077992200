mod cli_logger;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use tracegrid::{
    CompareArgs, Config, Metric, RunLayout, RunSelection, TraceGridError, bounds_command,
    compare_command, discover_command, schema_doc, series_command,
};

use crate::cli_logger::CliLogger;

/// Side-by-side performance trace comparison across runs.
#[derive(Debug, Parser)]
#[command(name = "tracegrid", version)]
struct Cli {
    /// Config file (default: ./tracegrid.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit compact JSON instead of the pretty tree
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render the comparison grid for two or more runs
    Compare(CompareArgs),
    /// Compute the shared axis bounds without rendering
    Bounds(RunSelection),
    /// Print one run's aligned series for a metric
    Series {
        #[arg(value_name = "VERSION")]
        version: String,
        #[arg(long, value_enum)]
        metric: Metric,
        #[arg(long)]
        log_dir: Option<PathBuf>,
        #[arg(long, value_enum)]
        layout: Option<RunLayout>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List versions with logs in the log directory
    Discover {
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Describe log kinds, fields and metric codes
    Schema,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Compare(_) => "compare",
            Command::Bounds(_) => "bounds",
            Command::Series { .. } => "series",
            Command::Discover { .. } => "discover",
            Command::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    let logger = CliLogger::new(cli.json, cli.no_color);
    match run(&cli, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<TraceGridError>()
                .map(TraceGridError::code)
                .unwrap_or("error");
            logger.print_error(code, &format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, logger: &CliLogger) -> anyhow::Result<()> {
    let config = Config::resolve(cli.config.as_deref())?;
    let value = match &cli.command {
        Command::Compare(args) => compare_command(&config, args)?,
        Command::Bounds(selection) => bounds_command(&config, selection)?,
        Command::Series {
            version,
            metric,
            log_dir,
            layout,
            out,
        } => {
            let selection = RunSelection {
                log_dir: log_dir.clone(),
                layout: *layout,
                ..RunSelection::default()
            };
            series_command(&config, version, *metric, &selection, out.as_deref())?
        }
        Command::Discover { log_dir } => discover_command(&config, log_dir.as_deref())?,
        Command::Schema => serde_json::to_value(schema_doc())?,
    };

    if let Some(runs) = value.get("runs").and_then(|r| r.as_array())
        && runs.len() == 1
    {
        logger.print_warning("only one run selected; panels have nothing to compare against");
    }
    logger.print_serialized(cli.command.name(), &value)
}
