// API client module: a small blocking HTTP client for the BHTOM upload
// service. One multipart POST per file, no retries; the caller decides
// what a non-2xx status means.

use crate::metadata::UploadRecord;
use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::fmt;
use std::fs::File;

/// Upload endpoint used when `--url` is not given.
pub const BHTOM_URL: &str = "https://uploadsvc2.astrolabs.pl/upload/";

/// Shared secret used to authenticate uploads.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Sent as a `hashtag` header.
    Hashtag(String),
    /// Sent as `Authorization: Token <token>`.
    Token(String),
}

impl Credential {
    /// Header carrying this credential. Fails if the secret contains
    /// characters that are not allowed in a header value.
    pub fn header(&self) -> Result<(HeaderName, HeaderValue)> {
        let (name, value) = match self {
            Credential::Hashtag(h) => (HeaderName::from_static("hashtag"), h.clone()),
            Credential::Token(t) => (AUTHORIZATION, format!("Token {}", t)),
        };
        let mut value = HeaderValue::from_str(&value).context("Credential is not a valid HTTP header value")?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

// Never print the secret itself, logs go to disk.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Hashtag(_) => f.write_str("Hashtag(***)"),
            Credential::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// What came back from the service for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: StatusCode,
    pub body: String,
}

impl UploadResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Sends a single upload record. An `Err` means the request could not be
/// completed at all; any HTTP status, including errors, is an `Ok`.
#[cfg_attr(test, mockall::automock)]
pub trait Uploader {
    fn upload(&self, record: &UploadRecord) -> Result<UploadResponse>;
}

/// Blocking client bound to one endpoint and one credential.
#[derive(Clone)]
pub struct BhtomClient {
    client: Client,
    url: String,
}

impl fmt::Debug for BhtomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BhtomClient").field("url", &self.url).finish()
    }
}

impl BhtomClient {
    /// Build a client whose every request carries `credential`.
    pub fn new(url: impl Into<String>, credential: &Credential) -> Result<Self> {
        let (name, value) = credential.header()?;
        let mut headers = HeaderMap::new();
        headers.insert(name, value);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(BhtomClient {
            client,
            url: url.into(),
        })
    }

    fn form(record: &UploadRecord) -> Result<multipart::Form> {
        let mut form = multipart::Form::new();
        for (name, value) in record.form_fields() {
            form = form.text(name, value);
        }

        // The form owns the file handle, so it is closed once the request
        // finishes or fails.
        let file = File::open(&record.path).with_context(|| format!("Failed to open {}", record.path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", record.path.display()))?
            .len();
        // A known length lets the whole form go out with Content-Length
        // instead of chunked encoding.
        let part = multipart::Part::reader_with_length(file, len)
            .file_name(record.file_name())
            .mime_str("application/octet-stream")
            .context("Invalid mime type for file part")?;
        Ok(form.part("files", part))
    }
}

impl Uploader for BhtomClient {
    fn upload(&self, record: &UploadRecord) -> Result<UploadResponse> {
        let form = Self::form(record)?;
        let res = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .with_context(|| format!("Failed to send {} to {}", record.path.display(), self.url))?;

        let status = res.status();
        let body = res
            .text()
            .with_context(|| format!("Failed to read response for {}", record.path.display()))?;
        Ok(UploadResponse { status, body })
    }
}
