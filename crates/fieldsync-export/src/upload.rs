// crates/fieldsync-export/src/upload.rs
// ============================================================================
// Module: Signed Object-Store Upload
// Description: AWS-style HMAC-signed PUT of export files to a bucket.
// Purpose: Deliver export artifacts without an object-store SDK dependency.
// Dependencies: fieldsync-core, base64, hmac, reqwest, serde, sha1, time, url
// ============================================================================

//! ## Overview
//! [`SignedUploader`] speaks the legacy AWS signature scheme directly: a
//! canonical string `PUT\n\n<content-type>\n<http-date>\n/<bucket>/<name>`
//! is HMAC-SHA1 signed with the secret key and base64-encoded into an
//! `Authorization: AWS <access-key>:<signature>` header. The HTTP date and
//! the signed string are computed from the same instant; a mismatch would
//! invalidate the signature. Uploads are never retried here, and a non-2xx
//! response is an error even when the transport succeeded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fieldsync_core::UploadError;
use hmac::Hmac;
use hmac::Mac;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::DATE;
use reqwest::redirect::Policy;
use serde::Deserialize;
use sha1::Sha1;
use time::OffsetDateTime;
use time::macros::format_description;
use url::Url;

use crate::geo::ExportFile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-upload timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Destination configuration for signed uploads.
///
/// # Invariants
/// - `endpoint` must parse as an absolute URL.
/// - `secret_key` never appears in errors or logs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadConfig {
    /// Object-store endpoint URL.
    pub endpoint: String,
    /// Destination bucket name.
    pub bucket: String,
    /// Access key placed in the authorization header.
    pub access_key: String,
    /// Secret key used for HMAC signing.
    pub secret_key: String,
    /// Per-upload timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Returns the default upload timeout.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Computes the base64 HMAC-SHA1 signature for an upload.
///
/// Deterministic for fixed inputs; the date string is supplied, not sampled,
/// so callers can sign and send the same instant.
///
/// # Errors
///
/// Returns [`UploadError::Signing`] when the secret key cannot key the MAC.
pub fn sign_upload(
    secret_key: &str,
    content_type: &str,
    http_date: &str,
    bucket: &str,
    file_name: &str,
) -> Result<String, UploadError> {
    let canonical = format!("PUT\n\n{content_type}\n{http_date}\n/{bucket}/{file_name}");
    let mut mac = Hmac::<Sha1>::new_from_slice(secret_key.as_bytes())
        .map_err(|_| UploadError::Signing("secret key rejected by mac".to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Formats an instant as the HTTP date line used in the canonical string.
fn http_date(stamp: OffsetDateTime) -> Result<String, UploadError> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    stamp
        .to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|err| UploadError::Signing(format!("http date format: {err}")))
}

// ============================================================================
// SECTION: Uploader
// ============================================================================

/// Uploads export files to an S3-compatible bucket with manual signing.
///
/// # Invariants
/// - Redirects are not followed; a redirect would resend signed headers to
///   an unintended host.
/// - Each file is consumed by exactly one PUT; there are no internal retries.
pub struct SignedUploader {
    /// Destination configuration.
    config: UploadConfig,
    /// HTTP client used for PUT requests.
    client: Client,
}

impl SignedUploader {
    /// Creates an uploader for the given destination.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] when the endpoint is unusable or the HTTP
    /// client cannot be constructed.
    pub fn new(config: UploadConfig) -> Result<Self, UploadError> {
        if config.bucket.is_empty() {
            return Err(UploadError::Destination("bucket must not be empty".to_string()));
        }
        Url::parse(&config.endpoint)
            .map_err(|err| UploadError::Destination(format!("invalid endpoint: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(Policy::none())
            .build()
            .map_err(|err| UploadError::Transport(format!("http client build failed: {err}")))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Uploads one export file.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] on signing failure, transport failure, or a
    /// non-2xx response.
    pub fn upload(&self, file: &ExportFile) -> Result<(), UploadError> {
        self.upload_at(file, OffsetDateTime::now_utc())
    }

    /// Uploads one export file signed for the given instant.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] on signing failure, transport failure, or a
    /// non-2xx response.
    pub fn upload_at(&self, file: &ExportFile, stamp: OffsetDateTime) -> Result<(), UploadError> {
        let date = http_date(stamp)?;
        let signature = sign_upload(
            &self.config.secret_key,
            file.mime_type,
            &date,
            &self.config.bucket,
            &file.name,
        )?;
        let url = self.object_url(&file.name)?;
        let response = self
            .client
            .put(url)
            .header(AUTHORIZATION, format!("AWS {}:{signature}", self.config.access_key))
            .header(DATE, date)
            .header(CONTENT_TYPE, file.mime_type)
            .body(file.bytes.clone())
            .send()
            .map_err(|err| UploadError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Builds the destination URL for an object name.
    fn object_url(&self, name: &str) -> Result<Url, UploadError> {
        let base = Url::parse(&self.config.endpoint)
            .map_err(|err| UploadError::Destination(format!("invalid endpoint: {err}")))?;
        base.join(&format!("{}/{name}", self.config.bucket))
            .map_err(|err| UploadError::Destination(format!("invalid object path: {err}")))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions.
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use time::macros::datetime;

    use super::http_date;
    use super::sign_upload;

    #[test]
    fn signatures_are_deterministic() {
        let first = sign_upload(
            "secret",
            "application/geo+json",
            "Tue, 27 Mar 2007 21:15:45 GMT",
            "exports",
            "observations_20070327T211545Z.geojson",
        )
        .expect("signature");
        let second = sign_upload(
            "secret",
            "application/geo+json",
            "Tue, 27 Mar 2007 21:15:45 GMT",
            "exports",
            "observations_20070327T211545Z.geojson",
        )
        .expect("signature");
        assert_eq!(first, second);
    }

    #[test]
    fn signature_is_base64_of_a_sha1_mac() {
        let signature = sign_upload(
            "secret",
            "application/geo+json",
            "Tue, 27 Mar 2007 21:15:45 GMT",
            "exports",
            "file.geojson",
        )
        .expect("signature");
        let raw = STANDARD.decode(&signature).expect("base64");
        assert_eq!(raw.len(), 20);
    }

    #[test]
    fn changing_the_date_changes_the_signature() {
        let monday = sign_upload("secret", "text/plain", "Mon, 01 Jan 2024 00:00:00 GMT", "b", "f")
            .expect("signature");
        let tuesday =
            sign_upload("secret", "text/plain", "Tue, 02 Jan 2024 00:00:00 GMT", "b", "f")
                .expect("signature");
        assert_ne!(monday, tuesday);
    }

    #[test]
    fn http_dates_use_the_gmt_wire_form() {
        let date = http_date(datetime!(2007-03-27 21:15:45 UTC)).expect("date");
        assert_eq!(date, "Tue, 27 Mar 2007 21:15:45 GMT");
    }
}
