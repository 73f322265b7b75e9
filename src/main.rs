mod cli;
mod engine;
mod logging;
mod model;
mod preflight;
mod storage;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(&args.log_level)?;

    // Launch and write failures propagate as errors (exit 1); anything the
    // child returns, zero or not, becomes our own exit status.
    let code = cli::run(args).await?;
    std::process::exit(code);
}
