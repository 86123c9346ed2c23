// File enumeration: `dir` + glob pattern -> sorted list of files.

use glob::{glob_with, GlobError, MatchOptions, PatternError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pattern used when none is given on the command line.
pub const DEFAULT_PATTERN: &str = "*.fits";

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("invalid file pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("cannot read matched path: {0}")]
    Entry(#[from] GlobError),
}

/// List regular files in `dir` matching `pattern`, in lexicographic
/// path order. No match is not an error.
///
/// Wildcards do not match a leading `.`, so hidden files such as the
/// `._name.fits` sidecars macOS leaves on shared drives are skipped
/// unless the pattern names the dot itself.
pub fn enumerate(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, FilesError> {
    let full = dir.join(pattern);
    let full = full.to_string_lossy();
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let mut files = Vec::new();
    for entry in glob_with(&full, options).map_err(|source| FilesError::Pattern {
        pattern: full.to_string(),
        source,
    })? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    log::debug!("{} file(s) match {}", files.len(), full);
    Ok(files)
}
