// FITS primary header access.
//
// Only two header keywords are needed to route an upload, so this opens
// the file with cfitsio, reads them from the primary HDU and closes it.
// Pixel data is never loaded.

use fitsio::hdu::FitsHdu;
use fitsio::FitsFile;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

// cfitsio keeps a global table of open files; one file at a time per process.
static CFITSIO: Mutex<()> = Mutex::new(());

pub(crate) fn cfitsio_lock() -> MutexGuard<'static, ()> {
    CFITSIO.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// cfitsio status for "keyword not found in header".
const KEY_NO_EXIST: i32 = 202;

#[derive(Debug, Error)]
pub enum FitsError {
    #[error("failed to open FITS file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: fitsio::errors::Error,
    },

    #[error("header key `{key}` not found in {path}")]
    MissingKey { key: String, path: PathBuf },

    #[error("failed to read header key `{key}` from {path}: {source}")]
    Read {
        key: String,
        path: PathBuf,
        #[source]
        source: fitsio::errors::Error,
    },
}

/// Open primary HDU of one FITS file. The file is closed on drop.
pub struct PrimaryHeader {
    file: FitsFile,
    hdu: FitsHdu,
    path: PathBuf,
    // Declared last so the file is closed before the lock is released.
    _lock: MutexGuard<'static, ()>,
}

impl std::fmt::Debug for PrimaryHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryHeader").field("path", &self.path).finish()
    }
}

impl PrimaryHeader {
    pub fn open(path: &Path) -> Result<Self, FitsError> {
        let lock = cfitsio_lock();
        let open_err = |source| FitsError::Open {
            path: path.to_path_buf(),
            source,
        };
        let mut file = FitsFile::open(path).map_err(open_err)?;
        let hdu = file.primary_hdu().map_err(open_err)?;
        Ok(PrimaryHeader {
            file,
            hdu,
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// String value of `key`, as cfitsio returns it: quotes and trailing
    /// blanks removed. Lookup is case-insensitive.
    pub fn read_string(&mut self, key: &str) -> Result<String, FitsError> {
        self.hdu.read_key::<String>(&mut self.file, key).map_err(|source| match source {
            fitsio::errors::Error::Fits(ref e) if e.status == KEY_NO_EXIST => FitsError::MissingKey {
                key: key.to_string(),
                path: self.path.clone(),
            },
            source => FitsError::Read {
                key: key.to_string(),
                path: self.path.clone(),
                source,
            },
        })
    }
}
