use std::fs::OpenOptions;
use std::io;

use clap::Parser;
use log::{error, LevelFilter};
use simplelog::{ConfigBuilder, WriteLogger};

use coredump_reporter::pipeline::CrashArgs;
use coredump_reporter::{pipeline, Config};

/// Kernel core dump handler: capture, backtrace, upload, report.
///
/// Install with:
///   sysctl -w kernel.core_pattern="|/path/to/coredump-reporter %h.core.%e.%t %s"
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Core-identifying token built by the kernel (%h.core.%e.%t).
    dump_name: String,
    /// Number of the signal that terminated the process (%s).
    signal: String,
}

#[tokio::main]
async fn main() {
    // Arity errors print usage and leave; the log file is only touched
    // once we know this is a real invocation.
    let args = Args::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} - bad configuration: {err}", err.name());
            return;
        }
    };

    init_logger(&config);

    let crash = CrashArgs {
        dump_name: args.dump_name,
        signal: args.signal,
    };
    let mut stdin = io::stdin().lock();
    if let Err(err) = pipeline::run(&config, &crash, &mut stdin).await {
        error!("{} - {err}", err.name());
    }
}

/// Append to the configured log file. Failures are communicated through
/// the log and the chat message, never the exit status, so the logger is
/// the one piece of plumbing worth complaining to stderr about.
fn init_logger(config: &Config) {
    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
    {
        Ok(file) => {
            let _ = WriteLogger::init(
                LevelFilter::Info,
                ConfigBuilder::new()
                    .set_location_level(LevelFilter::Off)
                    .set_thread_level(LevelFilter::Off)
                    .set_target_level(LevelFilter::Off)
                    .build(),
                file,
            );
        }
        Err(err) => {
            eprintln!(
                "unable to open log file {}: {err}",
                config.log_file.display()
            );
        }
    }
}
