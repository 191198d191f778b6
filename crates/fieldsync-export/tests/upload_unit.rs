// crates/fieldsync-export/tests/upload_unit.rs
// ============================================================================
// Module: Signed Upload Unit Tests
// Description: Signed PUT wire shape and export sink end-to-end behavior.
// ============================================================================

//! ## Overview
//! Captures signed PUT requests with a local `tiny_http` server: method,
//! object path, authorization shape, date/signature consistency, and body
//! bytes. Also drives [`GeoExportSink`] end to end to verify the geodata
//! pipeline uploads exactly one complete artifact per run.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::thread;

use fieldsync_core::RecordSink;
use fieldsync_core::UpstreamRecord;
use fieldsync_core::UploadError;
use fieldsync_export::ExportFile;
use fieldsync_export::GeoExportSink;
use fieldsync_export::SignedUploader;
use fieldsync_export::UploadConfig;
use fieldsync_export::sign_upload;
use serde_json::json;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

/// One captured PUT request.
struct CapturedPut {
    /// Request method as text.
    method: String,
    /// Request path.
    path: String,
    /// Authorization header value, if present.
    authorization: Option<String>,
    /// Date header value, if present.
    date: Option<String>,
    /// Content-Type header value, if present.
    content_type: Option<String>,
    /// Request body bytes.
    body: Vec<u8>,
}

/// Serves one request with the given status and returns what was captured.
fn capture_one(status: u16) -> (String, thread::JoinHandle<CapturedPut>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let endpoint = format!("http://{}/", server.server_addr());
    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request");
        let header = |name: &str| {
            request
                .headers()
                .iter()
                .find(|header| header.field.as_str().as_str().eq_ignore_ascii_case(name))
                .map(|header| header.value.as_str().to_string())
        };
        let captured = CapturedPut {
            method: request.method().to_string(),
            path: request.url().to_string(),
            authorization: header("authorization"),
            date: header("date"),
            content_type: header("content-type"),
            body: {
                let mut body = Vec::new();
                request.as_reader().read_to_end(&mut body).expect("body");
                body
            },
        };
        request.respond(Response::from_string("").with_status_code(status)).expect("respond");
        captured
    });
    (endpoint, handle)
}

/// Builds an uploader against the given endpoint.
fn uploader(endpoint: &str) -> SignedUploader {
    SignedUploader::new(UploadConfig {
        endpoint: endpoint.to_string(),
        bucket: "exports".to_string(),
        access_key: "AKTEST".to_string(),
        secret_key: "swordfish".to_string(),
        timeout_ms: 5_000,
    })
    .expect("uploader")
}

// ============================================================================
// SECTION: Signed PUT Wire Shape
// ============================================================================

#[test]
fn upload_sends_a_signed_put_with_consistent_date() {
    let (endpoint, handle) = capture_one(200);
    let file = ExportFile {
        name: "observations_20240102T030405Z.geojson".to_string(),
        mime_type: "application/geo+json",
        bytes: b"{\"type\":\"FeatureCollection\",\"features\":[]}".to_vec(),
    };

    uploader(&endpoint).upload(&file).expect("upload");
    let captured = handle.join().expect("server thread");

    assert_eq!(captured.method, "PUT");
    assert_eq!(captured.path, "/exports/observations_20240102T030405Z.geojson");
    assert_eq!(captured.content_type.as_deref(), Some("application/geo+json"));
    assert_eq!(captured.body, file.bytes);

    // The sent signature must match a recomputation over the sent date.
    let date = captured.date.expect("date header");
    let expected = sign_upload("swordfish", file.mime_type, &date, "exports", &file.name)
        .expect("signature");
    assert_eq!(captured.authorization.as_deref(), Some(format!("AWS AKTEST:{expected}").as_str()));
    assert!(date.ends_with("GMT"));
}

#[test]
fn rejected_upload_surfaces_the_status() {
    let (endpoint, handle) = capture_one(403);
    let file = ExportFile {
        name: "observations_20240102T030405Z.geojson".to_string(),
        mime_type: "application/geo+json",
        bytes: b"{}".to_vec(),
    };

    let error = uploader(&endpoint).upload(&file).expect_err("rejected");
    assert_eq!(
        error,
        UploadError::Status {
            status: 403
        }
    );
    handle.join().expect("server thread");
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    // Port 1 on loopback refuses connections.
    let file = ExportFile {
        name: "f.geojson".to_string(),
        mime_type: "application/geo+json",
        bytes: b"{}".to_vec(),
    };
    let error = uploader("http://127.0.0.1:1/").upload(&file).expect_err("unreachable");
    assert!(matches!(error, UploadError::Transport(_)));
}

#[test]
fn empty_bucket_is_rejected_at_construction() {
    let result = SignedUploader::new(UploadConfig {
        endpoint: "http://127.0.0.1:1/".to_string(),
        bucket: String::new(),
        access_key: "AKTEST".to_string(),
        secret_key: "swordfish".to_string(),
        timeout_ms: 1_000,
    });
    assert!(matches!(result, Err(UploadError::Destination(_))));
}

// ============================================================================
// SECTION: Export Sink
// ============================================================================

#[test]
fn export_sink_uploads_one_complete_collection_per_run() {
    let (endpoint, handle) = capture_one(200);
    let sink = GeoExportSink::new(uploader(&endpoint));

    let mut writer = sink.begin().expect("begin");
    writer
        .write_batch(&[
            UpstreamRecord::from_value(json!({"id": "a", "longitude": 1.0, "latitude": 2.0}))
                .expect("record"),
        ])
        .expect("batch");
    writer
        .write_batch(&[UpstreamRecord::from_value(json!({"id": "b"})).expect("record")])
        .expect("batch");
    let report = writer.finish().expect("finish");

    assert_eq!(report.rows_written, 2);
    let name = report.detail.expect("object name");
    assert!(name.starts_with("observations_"));
    assert!(name.ends_with(".geojson"));

    let captured = handle.join().expect("server thread");
    assert_eq!(captured.path, format!("/exports/{name}"));
    let body: serde_json::Value = serde_json::from_slice(&captured.body).expect("geojson body");
    assert_eq!(body["features"].as_array().expect("features").len(), 2);
}
