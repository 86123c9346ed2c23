// Entrypoint for `send-fits`: uploads every FITS file in a directory,
// taking object and filter from each file's header and the endpoint and
// hashtag from `config.yaml`.
// Any error from `run` ends the process with exit code 1.

use anyhow::Context;
use bhtom_uploader::api::BhtomClient;
use bhtom_uploader::cli::SendFitsArgs;
use bhtom_uploader::{config, logging, pipeline};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = SendFitsArgs::parse();
    let _log = match logging::init(&args.log_file, args.verbose) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    // Errors are reported through the logger only, so they reach the
    // terminal and the log file exactly once.
    ExitCode::from(logging::report(run(&args)))
}

fn run(args: &SendFitsArgs) -> anyhow::Result<()> {
    // Config, hashtag and every header are resolved before the first request.
    let batch = pipeline::prepare_send_fits(args, config::env_lookup)?;
    let client = BhtomClient::new(batch.url, &batch.credential).context("Failed to set up upload client")?;

    pipeline::send_batch(&client, &batch.records)?;
    Ok(())
}
