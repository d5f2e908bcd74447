use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::batch::check_rewrite_batch_size;
use crate::error::Result;
use crate::opts::ConnOpts;
use crate::params::BenchParams;

/// Run batched insert benchmarks against MySQL
#[derive(Parser, Debug)]
#[command(name = "insert-bench")]
pub struct Args {
    /// Number of rows queued before each batch is executed
    #[arg(short = 'b', long = "batchsize", value_name = "N")]
    pub batch_size: usize,

    /// Number of rows each thread inserts
    #[arg(short = 'n', long = "numberofrows", value_name = "N")]
    pub rows: u32,

    /// Number of parallel threads, each with its own connection
    #[arg(short = 't', long = "numberofthreads", value_name = "N")]
    pub threads: usize,

    /// Rewrite each batch into a single multi-row INSERT
    #[arg(
        short = 'r',
        long = "rewrite",
        value_name = "BOOL",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value_t = false
    )]
    pub rewrite: bool,

    /// Use multi-column insert statement (all datatypes). Currently ignored.
    #[arg(short = 'f', long = "full")]
    pub full: bool,

    /// Server to benchmark, `?rewriteBatchedStatements=true` is honored
    #[arg(
        short = 'u',
        long = "url",
        env = "DATABASE_URL",
        default_value = "mysql://root@localhost:3306"
    )]
    pub url: String,

    /// Seconds before running workers are asked to stop, 0 to wait for them
    #[arg(long, value_name = "SECS", default_value_t = 20)]
    pub deadline: u64,

    /// Log more (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Validated configuration for one benchmark run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub conn: ConnOpts,
    pub params: BenchParams,
    pub full: bool,
}

impl Args {
    pub fn into_config(self) -> Result<Config> {
        let mut conn = ConnOpts::try_from(self.url.as_str())?;
        conn.rewrite_batched_statements |= self.rewrite;
        let deadline = (self.deadline > 0).then(|| Duration::from_secs(self.deadline));
        let params =
            BenchParams::new(self.rows, self.batch_size, self.threads)?.with_deadline(deadline);
        if conn.rewrite_batched_statements {
            check_rewrite_batch_size(params.batch_size)?;
        }
        Ok(Config {
            conn,
            params,
            full: self.full,
        })
    }
}

/// Condenses a clap error into one line without clap's `error:` prefix or
/// the usage trailer.
pub fn parse_error_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let mut message = String::new();
    for line in rendered.lines().take_while(|line| !line.trim().is_empty()) {
        let line = line.trim();
        let line = line.strip_prefix("error:").map_or(line, str::trim_start);
        if !message.is_empty() {
            message.push(' ');
        }
        message.push_str(line);
    }
    message
}
