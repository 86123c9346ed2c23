// Run orchestration for both binaries.
//
// `prepare_*` turns arguments into a ready batch: credential resolved,
// files enumerated, one record per file. Nothing touches the network
// until `send_batch`, which walks the records in order.

use crate::api::{Credential, Uploader};
use crate::cli::{SendFitsArgs, UploadArgs};
use crate::config::{self, Config, TOKEN_ENV_VAR};
use crate::files;
use crate::metadata::{self, HeaderKeys, RunFields, UploadRecord};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A batch ready to send: where, as whom, and what.
#[derive(Debug)]
pub struct PreparedBatch {
    pub url: String,
    pub credential: Credential,
    pub records: Vec<UploadRecord>,
}

/// Counts for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub rejected: usize,
}

/// Header-driven run: config, hashtag, files, then one header read per file.
pub fn prepare_send_fits<F>(args: &SendFitsArgs, env: F) -> Result<PreparedBatch>
where
    F: Fn(&str) -> Option<String>,
{
    let config = Config::load(&args.config).context("Failed to load configuration")?;
    let hashtag = config.hashtag(env)?;
    let names_map = config::load_names_map(&args.names_map).context("Failed to load names map")?;
    let object_map = config.object_map.clone().unwrap_or_default().merged_with(&names_map);
    log::debug!("{} object name remapping(s) in effect", object_map.len());

    let files = list_files(&args.dir, &args.pattern)?;

    let keys = HeaderKeys {
        filter_key: &config.filter_key,
        object_key: &config.object_key,
        filter_map: config.filter_map.as_ref(),
        object_map: Some(&object_map),
    };
    let run = RunFields {
        data_product_type: config.data_product_type.clone(),
        matching_radius: config.radius,
        observatory: config.observatory.clone(),
        dry_run: args.dryrun,
        ..RunFields::default()
    };
    let records = metadata::resolve_from_headers(&files, &keys, run).context("Failed to read FITS headers")?;

    Ok(PreparedBatch {
        url: config.bhtom_url.clone(),
        credential: Credential::Hashtag(hashtag),
        records,
    })
}

/// Flag-driven run: token, files, then the same object/filter for all.
pub fn prepare_upload<F>(args: &UploadArgs, env: F) -> Result<PreparedBatch>
where
    F: Fn(&str) -> Option<String>,
{
    let token = config::resolve_secret(args.token.as_deref(), TOKEN_ENV_VAR, env)
        .context("No token found. Check -h for help")?;

    let files = list_files(&args.dir, &args.pattern)?;

    let run = RunFields {
        data_product_type: args.data_product_type.clone(),
        matching_radius: args.radius,
        legacy_radius: true,
        observatory: args.observatory_name.clone(),
        observer: args.observer.clone(),
        mjd: args.mjd.clone(),
        comment: args.comment.clone(),
        dry_run: args.dry_run,
        no_plot: args.no_plot,
    };
    info!("Request configuration: {}", describe(&run_fields_preview(&run)));
    let records = metadata::resolve_from_flags(&files, &args.object_name, &args.filter, run);

    Ok(PreparedBatch {
        url: args.url.clone(),
        credential: Credential::Token(token),
        records,
    })
}

fn list_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let files = files::enumerate(dir, pattern).with_context(|| format!("Failed to list files in {}", dir.display()))?;
    let listing: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    info!("Files to send:\n{}", listing.join("\n"));
    Ok(files)
}

// Run-level fields as they will appear on the wire, without per-file values.
fn run_fields_preview(run: &RunFields) -> Vec<(&'static str, String)> {
    let preview = UploadRecord {
        path: PathBuf::new(),
        target: String::new(),
        filter: String::new(),
        run: Rc::new(run.clone()),
    };
    preview
        .form_fields()
        .into_iter()
        .filter(|(name, _)| *name != "target" && *name != "filter")
        .collect()
}

fn describe(fields: &[(&'static str, String)]) -> String {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect();
    Value::Object(map).to_string()
}

/// Send every record in order.
///
/// A non-2xx answer is logged and the loop moves on; an `Err` from the
/// uploader ends the batch immediately.
pub fn send_batch(uploader: &dyn Uploader, records: &[UploadRecord]) -> Result<BatchReport> {
    info!("START PROCESSING........");
    let mut report = BatchReport::default();

    for record in records {
        info!("Sending {}", record.path.display());
        info!("File data: {}", describe(&record.form_fields()));

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Sending {}", record.file_name()));

        let result = uploader.upload(record);
        spinner.finish_and_clear();
        let response = result?;

        info!("Server response: {}, {}", response.body, response.status.as_u16());
        info!("{}", "-".repeat(40));

        report.sent += 1;
        if !response.is_success() {
            log::warn!("{} was rejected with status {}", record.path.display(), response.status);
            report.rejected += 1;
        }
    }

    info!(
        "Sent {} file(s), {} rejected by the server",
        report.sent, report.rejected
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockUploader, UploadResponse};
    use crate::config::HASHTAG_ENV_VAR;
    use crate::fits::test_support::write_fits;
    use anyhow::anyhow;
    use clap::Parser;
    use mockall::Sequence;
    use reqwest::StatusCode;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
bhtom_url: "https://bhtom.example/upload/"
filter_key: FILTER
object_key: OBJECT
radius: 2
filter_map:
  V: GaiaSP/V
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_with(name: &'static str, value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |k| (k == name).then(|| value.to_string())
    }

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new(config: &str) -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir(dir.path().join("images")).unwrap();
            fs::write(dir.path().join("config.yaml"), config).unwrap();
            fs::write(dir.path().join("names_map.yaml"), "M31x: M31\n").unwrap();
            Workspace { dir }
        }

        fn images(&self) -> PathBuf {
            self.dir.path().join("images")
        }

        fn add(&self, name: &str, object: &str, filter: &str) -> PathBuf {
            write_fits(&self.images(), name, &[("OBJECT", object), ("FILTER", filter)])
        }

        fn args(&self, extra: &[&str]) -> SendFitsArgs {
            let root = self.dir.path();
            let mut argv = vec![
                "send-fits".to_string(),
                "-d".into(),
                self.images().display().to_string(),
                "--config".into(),
                root.join("config.yaml").display().to_string(),
                "--names-map".into(),
                root.join("names_map.yaml").display().to_string(),
            ];
            argv.extend(extra.iter().map(|s| s.to_string()));
            SendFitsArgs::try_parse_from(argv).unwrap()
        }
    }

    fn ok(status: StatusCode) -> Result<UploadResponse> {
        Ok(UploadResponse {
            status,
            body: "{}".into(),
        })
    }

    fn upload_args(dir: &Path, extra: &[&str]) -> UploadArgs {
        let mut argv = vec![
            "upload-files".to_string(),
            "-d".into(),
            dir.display().to_string(),
            "-p".into(),
            "*.fits".into(),
            "-o".into(),
            "Gaia22xyz".into(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        UploadArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_three_files_three_posts_in_sorted_order() {
        let ws = Workspace::new(&format!("{}bhtom_hashtag: ABC\n", CONFIG));
        ws.add("c.fits", "M33", "R");
        ws.add("a.fits", "M31x", "V");
        ws.add("b.fits", " M31 ", "V");

        let batch = prepare_send_fits(&ws.args(&[]), no_env).unwrap();
        assert_eq!(batch.url, "https://bhtom.example/upload/");
        assert_eq!(batch.credential, Credential::Hashtag("ABC".into()));

        let expected = [("a.fits", "M31", "GaiaSP/V"), ("b.fits", "M31", "GaiaSP/V"), ("c.fits", "M33", "R")];
        let mut seq = Sequence::new();
        let mut uploader = MockUploader::new();
        for (name, target, filter) in expected {
            uploader
                .expect_upload()
                .withf(move |r| r.path.ends_with(name) && r.target == target && r.filter == filter)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| ok(StatusCode::CREATED));
        }

        let report = send_batch(&uploader, &batch.records).unwrap();
        assert_eq!(report, BatchReport { sent: 3, rejected: 0 });
    }

    #[test]
    fn test_hashtag_from_env_is_equivalent() {
        let in_config = Workspace::new(&format!("{}bhtom_hashtag: ABC\n", CONFIG));
        let in_env = Workspace::new(CONFIG);
        for ws in [&in_config, &in_env] {
            ws.add("a.fits", "M31x", "V");
        }

        let a = prepare_send_fits(&in_config.args(&[]), no_env).unwrap();
        let b = prepare_send_fits(&in_env.args(&[]), env_with(HASHTAG_ENV_VAR, "ABC")).unwrap();
        assert_eq!(a.credential, b.credential);
        assert_eq!(a.records.len(), b.records.len());
        assert_eq!(a.records[0].target, b.records[0].target);
        assert_eq!(a.records[0].form_fields(), b.records[0].form_fields());
    }

    #[test]
    fn test_missing_hashtag_sends_nothing() {
        let ws = Workspace::new(CONFIG);
        ws.add("a.fits", "M31", "V");

        let err = prepare_send_fits(&ws.args(&[]), no_env).unwrap_err();
        assert!(err.to_string().contains(HASHTAG_ENV_VAR));
    }

    #[test]
    fn test_missing_names_map_stops_the_run() {
        let ws = Workspace::new(&format!("{}bhtom_hashtag: ABC\n", CONFIG));
        ws.add("a.fits", "M31", "V");
        fs::remove_file(ws.dir.path().join("names_map.yaml")).unwrap();

        let err = prepare_send_fits(&ws.args(&[]), no_env).unwrap_err();
        assert!(format!("{:#}", err).contains("names_map.yaml"));
    }

    #[test]
    fn test_missing_header_aborts_before_sending() {
        let ws = Workspace::new(&format!("{}bhtom_hashtag: ABC\n", CONFIG));
        ws.add("a.fits", "M31", "V");
        write_fits(&ws.images(), "b.fits", &[("OBJECT", "M31")]);

        let err = prepare_send_fits(&ws.args(&[]), no_env).unwrap_err();
        assert!(format!("{:#}", err).contains("FILTER"));
    }

    #[test]
    fn test_dryrun_flag_reaches_every_record() {
        let ws = Workspace::new(&format!("{}bhtom_hashtag: ABC\n", CONFIG));
        ws.add("a.fits", "M31", "V");
        ws.add("b.fits", "M31", "V");

        let batch = prepare_send_fits(&ws.args(&["--dryrun"]), no_env).unwrap();
        for record in &batch.records {
            assert!(record.form_fields().contains(&("dry_run", "True".to_string())));
        }
    }

    #[test]
    fn test_empty_directory_is_an_empty_batch() {
        let ws = Workspace::new(&format!("{}bhtom_hashtag: ABC\n", CONFIG));
        let batch = prepare_send_fits(&ws.args(&[]), no_env).unwrap();
        assert!(batch.records.is_empty());

        let mut uploader = MockUploader::new();
        uploader.expect_upload().never();
        assert_eq!(send_batch(&uploader, &batch.records).unwrap(), BatchReport::default());
    }

    #[test]
    fn test_rejected_file_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        for name in ["a.fits", "b.fits", "c.fits"] {
            fs::write(dir.path().join(name), b"SIMPLE").unwrap();
        }
        let batch = prepare_upload(&upload_args(dir.path(), &["-t", "tok"]), no_env).unwrap();

        let mut seq = Sequence::new();
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .withf(|r| r.path.ends_with("a.fits"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ok(StatusCode::BAD_REQUEST));
        for name in ["b.fits", "c.fits"] {
            uploader
                .expect_upload()
                .withf(move |r| r.path.ends_with(name))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| ok(StatusCode::OK));
        }

        let report = send_batch(&uploader, &batch.records).unwrap();
        assert_eq!(report, BatchReport { sent: 3, rejected: 1 });
    }

    #[test]
    fn test_transport_error_aborts_remaining_files() {
        let dir = TempDir::new().unwrap();
        for name in ["a.fits", "b.fits", "c.fits"] {
            fs::write(dir.path().join(name), b"SIMPLE").unwrap();
        }
        let batch = prepare_upload(&upload_args(dir.path(), &["-t", "tok"]), no_env).unwrap();

        let mut seq = Sequence::new();
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .withf(|r| r.path.ends_with("a.fits"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ok(StatusCode::OK));
        uploader
            .expect_upload()
            .withf(|r| r.path.ends_with("b.fits"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow!("connection refused")));

        let err = send_batch(&uploader, &batch.records).unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_upload_token_from_env() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.fits"), b"SIMPLE").unwrap();

        let batch = prepare_upload(&upload_args(dir.path(), &[]), env_with(TOKEN_ENV_VAR, "envtok")).unwrap();
        assert_eq!(batch.credential, Credential::Token("envtok".into()));
        assert_eq!(batch.url, crate::api::BHTOM_URL);
    }

    #[test]
    fn test_upload_without_token_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.fits"), b"SIMPLE").unwrap();

        let err = prepare_upload(&upload_args(dir.path(), &[]), no_env).unwrap_err();
        assert!(err.to_string().contains("No token found"));
    }

    #[test]
    fn test_upload_records_share_flags() {
        let dir = TempDir::new().unwrap();
        for name in ["b.fits", "a.fits"] {
            fs::write(dir.path().join(name), b"SIMPLE").unwrap();
        }

        let args = upload_args(dir.path(), &["-t", "tok", "-f", "GaiaSP/G", "--observer", "jdoe", "--no_plot"]);
        let batch = prepare_upload(&args, no_env).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert!(batch.records[0].path.ends_with("a.fits"));

        let fields = batch.records[1].form_fields();
        assert!(fields.contains(&("target", "Gaia22xyz".to_string())));
        assert!(fields.contains(&("filter", "GaiaSP/G".to_string())));
        assert!(fields.contains(&("radius", "2".to_string())));
        assert!(fields.contains(&("observer", "jdoe".to_string())));
        assert!(fields.contains(&("no_plot", "True".to_string())));
        assert!(fields.contains(&("dry_run", "False".to_string())));
    }

    #[test]
    fn test_upload_mjd_is_sent_with_every_digit() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.fits"), b"SIMPLE").unwrap();

        let args = upload_args(dir.path(), &["-t", "tok", "--mjd", "60000.12345678901234"]);
        let batch = prepare_upload(&args, no_env).unwrap();
        let fields = batch.records[0].form_fields();
        assert!(fields.contains(&("mjd", "60000.12345678901234".to_string())));
    }
}
