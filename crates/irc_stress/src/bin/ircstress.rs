use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use flexi_logger::Logger;
use irc_stress::cli::Args;
use irc_stress::config::StressConfig;
use irc_stress::errors::StressResult;
use irc_stress::report::print_summary;
use irc_stress::runner::{build_queues, run_server};
use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    // stdout carries the result tables, logs go to stderr
    let _logger = Logger::try_with_str(&args.log_level)
        .and_then(|op| op.log_to_stderr().start())
        .ok();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("ircstress: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> StressResult<()> {
    let config = match &args.config {
        Some(path) => StressConfig::load(path)?,
        None => StressConfig::default(),
    };
    let settings = Arc::new(config.client_settings());
    let flood = args.mode.flood();
    let options = args.mode.script_options();
    let nicks = flood.nicks()?;

    println!("Running tests ({})", options.describe());
    for details in &flood.servers {
        println!("Testing server {} at {}", details.name, details.conn.address);
    }

    for details in &flood.servers {
        info!("Testing {}", details.name);
        let server = details.build(nicks.len());
        let queues = build_queues(&nicks, &options, &settings);
        let summary = run_server(server, queues, config.spawn_delay()).await?;
        print_summary(&summary);
    }

    Ok(())
}
