use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use laptimes_etl::{run, Clock, EtlError, EtlResult, FixedClock, PipelineConfig, SystemClock};

/// Mean lap time per driver age
#[derive(Parser, Debug)]
#[command(name = "laptimes-etl", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = "etl_config.toml")]
    config: PathBuf,

    /// Output path, overriding the configured one
    #[arg(long)]
    output: Option<PathBuf>,

    /// Replace the output file if it already exists
    #[arg(long)]
    overwrite: bool,

    /// Run date used for ages (YYYY-MM-DD); defaults to the current UTC date
    #[arg(long, value_name = "DATE")]
    today: Option<NaiveDate>,
}

fn execute(args: Args) -> EtlResult<()> {
    let mut config = PipelineConfig::load(&args.config)?;
    if let Some(output) = args.output {
        config.output.path = output;
    }
    if args.overwrite {
        config.output.overwrite = true;
    }

    if let Some(threads) = config.num_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| EtlError::InvalidConfig(format!("thread pool: {e}")))?;
    }

    let clock: Box<dyn Clock> = match args.today {
        Some(date) => Box::new(FixedClock(date)),
        None => Box::new(SystemClock),
    };

    let summary = run(&config, clock.as_ref())?;
    info!(
        rows = summary.rows,
        today = %summary.today,
        output = %summary.output.display(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
