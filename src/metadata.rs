// Metadata resolution: turns an ordered list of files into upload
// records. The header-driven variant reads each file's FITS header, the
// flag-driven variant stamps the same object/filter on every file.

use crate::fits::{FitsError, PrimaryHeader};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Mapping from a locally used label to the name BHTOM expects.
/// Labels without an entry pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RemapTable(BTreeMap<String, String>);

impl RemapTable {
    pub fn apply(&self, value: &str) -> String {
        self.0.get(value).cloned().unwrap_or_else(|| value.to_string())
    }

    /// Layer `other` on top of this table; its entries win on conflicts.
    pub fn merged_with(mut self, other: &RemapTable) -> Self {
        self.0.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RemapTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Form fields that are the same for every file in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFields {
    pub data_product_type: String,
    pub matching_radius: f64,
    /// Also send the radius under the legacy `radius` field name.
    pub legacy_radius: bool,
    pub observatory: Option<String>,
    pub observer: Option<String>,
    /// Sent exactly as given on the command line.
    pub mjd: Option<String>,
    pub comment: Option<String>,
    pub dry_run: bool,
    pub no_plot: bool,
}

impl Default for RunFields {
    fn default() -> Self {
        Self {
            data_product_type: "fits_file".into(),
            matching_radius: 2.0,
            legacy_radius: false,
            observatory: None,
            observer: None,
            mjd: None,
            comment: None,
            dry_run: false,
            no_plot: false,
        }
    }
}

/// Everything needed to send a single file.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub path: PathBuf,
    pub target: String,
    pub filter: String,
    pub run: Rc<RunFields>,
}

impl UploadRecord {
    /// Textual multipart fields, in the order they are sent.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let run = &self.run;
        let mut fields = vec![
            ("target", self.target.clone()),
            ("filter", self.filter.clone()),
            ("data_product_type", run.data_product_type.clone()),
            ("matching_radius", run.matching_radius.to_string()),
        ];
        if run.legacy_radius {
            fields.push(("radius", run.matching_radius.to_string()));
        }

        let optional = [
            ("observatory", run.observatory.clone()),
            ("observer", run.observer.clone()),
            ("mjd", run.mjd.clone()),
            ("comment", run.comment.clone()),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v))),
        );

        fields.push(("dry_run", python_bool(run.dry_run).into()));
        if run.no_plot {
            fields.push(("no_plot", python_bool(true).into()));
        }
        fields
    }

    /// File name sent with the binary part.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.fits".into())
    }
}

// The upload service expects Django-style boolean strings.
fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Which header cards hold the filter and object name, plus the tables
/// that normalize them.
#[derive(Debug, Clone, Default)]
pub struct HeaderKeys<'a> {
    pub filter_key: &'a str,
    pub object_key: &'a str,
    pub filter_map: Option<&'a RemapTable>,
    pub object_map: Option<&'a RemapTable>,
}

/// Build one record per file from its FITS header.
///
/// The first file missing either key aborts the whole resolution; no
/// partial list is returned.
pub fn resolve_from_headers(
    files: &[PathBuf],
    keys: &HeaderKeys<'_>,
    run: RunFields,
) -> Result<Vec<UploadRecord>, FitsError> {
    let run = Rc::new(run);
    files
        .iter()
        .map(|path| resolve_one(path, keys, Rc::clone(&run)))
        .collect()
}

fn resolve_one(path: &Path, keys: &HeaderKeys<'_>, run: Rc<RunFields>) -> Result<UploadRecord, FitsError> {
    let mut header = PrimaryHeader::open(path)?;
    let raw_filter = header.read_string(keys.filter_key)?;
    let raw_object = header.read_string(keys.object_key)?;
    let (raw_filter, raw_object) = (raw_filter.trim(), raw_object.trim());

    let target = match keys.object_map {
        Some(map) => map.apply(raw_object),
        None => raw_object.to_string(),
    };
    let filter = match keys.filter_map {
        Some(map) => map.apply(raw_filter),
        None => raw_filter.to_string(),
    };

    Ok(UploadRecord {
        path: path.to_path_buf(),
        target,
        filter,
        run,
    })
}

/// Build one record per file, all sharing the given object and filter.
pub fn resolve_from_flags(files: &[PathBuf], target: &str, filter: &str, run: RunFields) -> Vec<UploadRecord> {
    let run = Rc::new(run);
    files
        .iter()
        .map(|path| UploadRecord {
            path: path.clone(),
            target: target.to_string(),
            filter: filter.to_string(),
            run: Rc::clone(&run),
        })
        .collect()
}
