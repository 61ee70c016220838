//! Request/response artifact persistence.
//!
//! Every captured transaction produces up to four files in its capture
//! directory, keyed by sequence id:
//!
//! ```text
//! 001_request_metadata.txt    request line + headers
//! 001_request_body.txt        raw request body
//! 001_response_metadata.txt   status line + headers
//! 001_response_body.txt       raw response body
//! ```
//!
//! Distinct sequence ids never share a file, so no locking is needed here.
//!
//! Headers are written in `HeaderMap` order: the first occurrence of each
//! name fixes its position and repeated values of a name are written together.
//! hyper keeps neither the wire order of interleaved repeats nor the original
//! case of header names (they are written lowercase).

use std::fmt::Write as _;
use std::path::Path;

use hyper::{HeaderMap, Method, StatusCode, Uri, Version};

use crate::error::CaptureError;
use crate::session::SessionState;

pub(crate) const REQUEST_METADATA: &str = "request_metadata.txt";
pub(crate) const REQUEST_BODY: &str = "request_body.txt";
pub(crate) const RESPONSE_METADATA: &str = "response_metadata.txt";
pub(crate) const RESPONSE_BODY: &str = "response_body.txt";

/// Returns the reason phrase for common status codes, `"Unknown"` otherwise.
pub fn status_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let _ = writeln!(
            out,
            "{}: {}",
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes())
        );
    }
}

/// Renders the request line followed by one `name: value` line per header.
pub fn format_request_metadata(
    method: &Method,
    uri: &Uri,
    version: Version,
    headers: &HeaderMap,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {} {:?}", method, uri, version);
    write_headers(&mut out, headers);
    out
}

/// Renders the status line followed by one `name: value` line per header.
pub fn format_response_metadata(
    status: StatusCode,
    version: Version,
    headers: &HeaderMap,
) -> String {
    let mut out = String::new();
    let code = status.as_u16();
    let _ = writeln!(out, "{:?} {} {}", version, code, status_phrase(code));
    write_headers(&mut out, headers);
    out
}

async fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), CaptureError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| CaptureError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Persists the request metadata and body for a tagged transaction.
///
/// An absent body is written as an empty file.
pub async fn write_request(
    session: &SessionState,
    method: &Method,
    uri: &Uri,
    version: Version,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), CaptureError> {
    let metadata = format_request_metadata(method, uri, version, headers);
    write_artifact(&session.artifact_path(REQUEST_METADATA), metadata.as_bytes()).await?;
    write_artifact(&session.artifact_path(REQUEST_BODY), body).await?;

    tracing::debug!(
        "Captured request #{:03} ({} body bytes)",
        session.sequence_id,
        body.len()
    );
    Ok(())
}

/// Persists the response metadata and body for a tagged transaction.
pub async fn write_response(
    session: &SessionState,
    status: StatusCode,
    version: Version,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), CaptureError> {
    let metadata = format_response_metadata(status, version, headers);
    write_artifact(&session.artifact_path(RESPONSE_METADATA), metadata.as_bytes()).await?;
    write_artifact(&session.artifact_path(RESPONSE_BODY), body).await?;

    tracing::debug!(
        "Captured response #{:03} ({} {} body bytes)",
        session.sequence_id,
        status.as_u16(),
        body.len()
    );
    Ok(())
}
