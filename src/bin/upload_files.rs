// Entrypoint for `upload-files`: uploads every file matching the pattern
// with the object name and filter given on the command line.

use anyhow::Context;
use bhtom_uploader::api::BhtomClient;
use bhtom_uploader::cli::UploadArgs;
use bhtom_uploader::{config, logging, pipeline};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = UploadArgs::parse();
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

fn run(args: &UploadArgs) -> anyhow::Result<()> {
    let batch = pipeline::prepare_upload(args, config::env_lookup)?;
    let client = BhtomClient::new(batch.url, &batch.credential).context("Failed to set up upload client")?;

    pipeline::send_batch(&client, &batch.records)?;
    Ok(())
}
