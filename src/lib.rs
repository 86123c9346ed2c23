// Library root
// ------------
// Shared code for the two BHTOM upload binaries (`src/bin/`). Both run
// the same linear pipeline: arguments/config -> file list -> one
// metadata record per file -> one blocking POST per record.
//
// Module responsibilities:
// - `cli`: clap argument structs for `send-fits` and `upload-files`.
// - `config`: YAML config and names map, secret resolution chain.
// - `files`: directory + glob pattern enumeration.
// - `fits`: primary header reader used to pick object and filter.
// - `metadata`: remap tables and upload records.
// - `api`: the HTTP client and the `Uploader` seam.
// - `pipeline`: ties the above together for each binary.
// - `logging`: console + append-only file logger.
pub mod api;
pub mod cli;
pub mod config;
pub mod files;
pub mod fits;
pub mod logging;
pub mod metadata;
pub mod pipeline;
