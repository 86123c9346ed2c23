use crate::api::BHTOM_URL;
use crate::config::{CONFIG_FILE_PATH, NAMES_MAP_FILE_PATH};
use crate::files::DEFAULT_PATTERN;
use crate::logging::LOG_FILE_PATH;
use clap::Parser;
use std::path::PathBuf;

/// Arguments for `send-fits`.
///
/// Object and filter come from each file's FITS header; the endpoint,
/// hashtag and remap tables come from `config.yaml`.
#[derive(Parser, Debug)]
#[command(name = "send-fits", about = "Send FITS images to BHTOM, reading object and filter from their headers")]
pub struct SendFitsArgs {
    /// Directory containing FITS images
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Glob pattern for files inside the directory
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Send data, but do not store datapoints in the BHTOM database
    #[arg(long)]
    pub dryrun: bool,

    /// Path to the YAML configuration
    #[arg(long, default_value = CONFIG_FILE_PATH)]
    pub config: PathBuf,

    /// Path to the YAML object-name remap document
    #[arg(long, default_value = NAMES_MAP_FILE_PATH)]
    pub names_map: PathBuf,

    /// Log file; appended to on every run
    #[arg(long, default_value = LOG_FILE_PATH)]
    pub log_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for `upload-files`.
///
/// Every matched file is sent with the same object name and filter.
#[derive(Parser, Debug)]
#[command(name = "upload-files", about = "Send FITS images or photometry files to BHTOM")]
pub struct UploadArgs {
    /// Directory containing FITS images or photometry files
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Glob pattern for files inside the directory, e.g. "*.fits"
    #[arg(short, long)]
    pub pattern: String,

    /// Object name
    #[arg(short, long = "object_name", visible_alias = "object-name")]
    pub object_name: String,

    /// Filter name
    #[arg(short, long, default_value = "GaiaSP/any")]
    pub filter: String,

    /// API token. If not provided, taken from the TOKEN environment variable
    #[arg(short, long)]
    pub token: Option<String>,

    /// Data product type
    #[arg(long = "data_product_type", visible_alias = "data-product-type", default_value = "fits_file")]
    pub data_product_type: String,

    /// Observer name
    #[arg(long)]
    pub observer: Option<String>,

    /// Observatory/facility the datapoints will be associated with
    #[arg(long = "observatory_name", visible_alias = "observatory-name")]
    pub observatory_name: Option<String>,

    /// Modified Julian Date (MJD = JD - 2400000.5)
    #[arg(long, value_parser = parse_mjd)]
    pub mjd: Option<String>,

    /// Matching radius in arcseconds
    #[arg(long, default_value_t = 2.0)]
    pub radius: f64,

    /// Send data, but do not store datapoints in the BHTOM database
    #[arg(long = "dry_run", visible_alias = "dry-run")]
    pub dry_run: bool,

    /// Process the data without generating plots
    #[arg(long = "no_plot", visible_alias = "no-plot")]
    pub no_plot: bool,

    /// Comment about the observation, data processing, etc.
    #[arg(long)]
    pub comment: Option<String>,

    /// Upload endpoint
    #[arg(long, default_value = BHTOM_URL)]
    pub url: String,

    /// Log file; appended to on every run
    #[arg(long, default_value = LOG_FILE_PATH)]
    pub log_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

// Must be a number, but is passed on verbatim so no digits are lost.
fn parse_mjd(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    trimmed
        .parse::<f64>()
        .map_err(|e| format!("`{}` is not a number: {}", value, e))?;
    Ok(trimmed.to_string())
}
