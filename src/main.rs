use clap::Parser;
use clap::error::ErrorKind;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use insert_bench::cli::{self, Args};
use insert_bench::orchestrator;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("Error : {}", cli::parse_error_message(&e));
            std::process::exit(1);
        }
    };

    init_tracing(args.verbose);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            println!("Error : {}", e);
            std::process::exit(1);
        }
    };
    if config.full {
        warn!("--full is accepted but has no effect, inserting into the single-column table");
    }

    let summary = orchestrator::run(&config.conn, &config.params)?;
    println!("{}", summary);
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}
