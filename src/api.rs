// API client module: a small blocking HTTP client that talks to the
// GitHub REST API. It is intentionally small and synchronous; the whole
// tool is one linear sequence of requests.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::retry::{send_with_retry, RetryPolicy};

/// Default API base for the hosted github.com instance. Tests point the
/// client at a local fixture server instead.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const ACCEPT_GITHUB_V3: &str = "application/vnd.github.v3+json";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// Everything outside the RFC 3986 unreserved set (ALPHA / DIGIT / "-" /
// "." / "_" / "~") gets percent-encoded, multi-byte characters as their
// UTF-8 byte sequences.
const FILENAME_QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Release metadata returned by the releases-by-tag endpoint. Only the
/// upload URL template is needed here.
#[derive(Deserialize, Debug)]
struct Release {
    upload_url: String,
}

/// Asset metadata returned after a successful upload.
#[derive(Deserialize, Debug)]
pub struct UploadedAsset {
    pub id: u64,
}

/// Blocking client for the two GitHub calls this tool makes: resolve a
/// release by tag and upload one asset to it. Holds the reqwest client,
/// the API base URL, the auth token and the retry policy.
pub struct ReleaseClient {
    client: Client,
    api_base: String,
    token: String,
    policy: RetryPolicy,
}

impl ReleaseClient {
    pub fn new(api_base: &str, token: &str, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ReleaseClient {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            policy,
        })
    }

    fn auth_value(&self) -> String {
        format!("token {}", self.token)
    }

    /// Resolve the tag to a concrete upload URL: one authenticated GET to
    /// the releases-by-tag endpoint, then strip the `{?name,label}`
    /// URI-template suffix from the returned `upload_url`.
    pub fn resolve_upload_url(&self, owner: &str, repo: &str, tag: &str) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_base, owner, repo, tag
        );
        let response = send_with_retry(&self.client, &self.policy, || {
            self.client
                .get(&url)
                .header(AUTHORIZATION, self.auth_value())
                .header(ACCEPT, ACCEPT_GITHUB_V3)
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_else(|_| "".into());
            bail!("Failed to get release: {} - {}", status, body);
        }

        let release: Release = response.json().context("Parsing release response json")?;
        let upload_url = strip_template_suffix(&release.upload_url).to_string();
        debug!(%upload_url, "resolved release upload URL");
        Ok(upload_url)
    }

    /// Upload one file as a release asset. The filename is taken from the
    /// path's base name, percent-encoded into the `name` query parameter,
    /// and the file's raw bytes are posted with a content type guessed
    /// from the extension.
    ///
    /// Returns the server-assigned asset id on HTTP 200/201; any other
    /// status or transport failure is an error carrying `status - body`
    /// or the transport error chain.
    pub fn upload_asset(&self, upload_url: &str, path: &Path) -> Result<UploadedAsset> {
        let filename = asset_filename(path)?;
        let encoded = encode_filename(&filename);
        let content_type = content_type_for(&filename);
        let url = format!("{}?name={}", upload_url, encoded);

        // Read the bytes up front: a retried POST has to be able to
        // resend the body, and the handle is released right here.
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read file {}", path.display()))?;

        let response = send_with_retry(&self.client, &self.policy, || {
            self.client
                .post(&url)
                .header(AUTHORIZATION, self.auth_value())
                .header(CONTENT_TYPE, content_type)
                .body(bytes.clone())
        })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = response.text().unwrap_or_else(|_| "".into());
            bail!("{} - {}", status, body);
        }

        let asset: UploadedAsset = response.json().context("Parsing asset response json")?;
        Ok(asset)
    }
}

/// Base name of the path as a UTF-8 string.
pub fn asset_filename(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .with_context(|| format!("Path has no file name: {}", path.display()))?;
    Ok(name.to_string_lossy().into_owned())
}

/// Percent-encode a filename for use as a query parameter value. The
/// encoding is the exact inverse of percent-decoding: only unreserved
/// characters pass through.
pub fn encode_filename(filename: &str) -> String {
    utf8_percent_encode(filename, FILENAME_QUERY_SET).to_string()
}

/// MIME type guessed from the filename extension, falling back to
/// `application/octet-stream` for unknown extensions.
pub fn content_type_for(filename: &str) -> &'static str {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Cut the `{?name,label}` URI-template placeholder off an upload URL:
/// everything from the first `{` onward is dropped.
pub fn strip_template_suffix(upload_url: &str) -> &str {
    match upload_url.find('{') {
        Some(pos) => &upload_url[..pos],
        None => upload_url,
    }
}

#[cfg(test)]
mod tests {
    use percent_encoding::percent_decode_str;

    use super::*;

    #[test]
    fn strip_template_suffix_removes_placeholder() {
        assert_eq!(
            strip_template_suffix(
                "https://uploads.github.com/repos/o/r/releases/1/assets{?name,label}"
            ),
            "https://uploads.github.com/repos/o/r/releases/1/assets"
        );
    }

    #[test]
    fn strip_template_suffix_passes_plain_urls_through() {
        let url = "https://uploads.github.com/repos/o/r/releases/1/assets";
        assert_eq!(strip_template_suffix(url), url);
    }

    #[test]
    fn encode_keeps_unreserved_characters() {
        assert_eq!(encode_filename("release-v1.0_final~x.tar.gz"), "release-v1.0_final~x.tar.gz");
    }

    #[test]
    fn encode_escapes_reserved_ascii() {
        assert_eq!(encode_filename("a b&c.txt"), "a%20b%26c.txt");
        assert_eq!(encode_filename("x/y.txt"), "x%2Fy.txt");
    }

    #[test]
    fn encode_escapes_hebrew_as_utf8_sequences() {
        assert_eq!(
            encode_filename("קובץ.pdf"),
            "%D7%A7%D7%95%D7%91%D7%A5.pdf"
        );
    }

    #[test]
    fn encode_decode_round_trips_non_ascii_names() {
        for name in ["קובץ.pdf", "résumé.doc", "файл с пробелом.bin", "日本語.zip"] {
            let encoded = encode_filename(name);
            assert!(encoded.is_ascii());
            let decoded = percent_decode_str(&encoded).decode_utf8().unwrap();
            assert_eq!(decoded, name);
        }
    }

    #[test]
    fn content_type_guessed_from_extension() {
        assert_eq!(content_type_for("report.pdf"), "application/pdf");
        assert_eq!(content_type_for("notes.txt"), "text/plain");
        assert_eq!(content_type_for("קובץ.pdf"), "application/pdf");
    }

    #[test]
    fn content_type_defaults_to_octet_stream() {
        assert_eq!(content_type_for("data.unknownext"), "application/octet-stream");
        assert_eq!(content_type_for("no_extension"), "application/octet-stream");
    }

    #[test]
    fn asset_filename_takes_the_base_name() {
        assert_eq!(
            asset_filename(Path::new("/tmp/some/dir/קובץ.pdf")).unwrap(),
            "קובץ.pdf"
        );
        assert_eq!(asset_filename(Path::new("plain.txt")).unwrap(), "plain.txt");
    }
}
