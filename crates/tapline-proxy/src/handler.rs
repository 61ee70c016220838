//! hudsucker hook handler.
//!
//! The engine clones the handler for every transaction and calls
//! `handle_request` then `handle_response` on the same clone, so the
//! [`SessionState`] set on the request side is the one read back on the
//! response side.

use http_body_util::{BodyExt, Full};
use hudsucker::{
    hyper::{Request, Response},
    Body, HttpContext, HttpHandler, RequestOrResponse,
};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, HOST};
use hyper::Version;

use crate::pipeline::{MockResponse, Pipeline, MOCK_CONTENT_TYPE};
use crate::session::SessionState;

/// Header marking responses synthesized by the proxy.
pub const MOCK_MARKER_HEADER: &str = "x-tapline-mock";

/// Helper to convert bytes to Body
fn bytes_to_body(bytes: Bytes) -> Body {
    Body::from(Full::new(bytes))
}

/// Reads a whole body. A failed read is logged and treated as empty.
async fn read_body(body: Body, side: &str, sequence_id: u64) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(
                "Failed to read {} body for #{:03}: {}",
                side,
                sequence_id,
                e
            );
            Bytes::new()
        }
    }
}

/// Returns the absolute URL of a request, rebuilding it from the Host
/// header when the URI is in origin form.
pub fn request_url<B>(req: &Request<B>) -> String {
    let uri = req.uri();
    if uri.authority().is_some() {
        return uri.to_string();
    }

    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{}{}", host, path)
}

fn mock_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(MOCK_CONTENT_TYPE));
    headers.insert(MOCK_MARKER_HEADER, HeaderValue::from_static("true"));
    headers
}

fn build_mock_response(mock: MockResponse, headers: HeaderMap) -> Response<Body> {
    let mut response = Response::new(bytes_to_body(Bytes::from(mock.body)));
    *response.status_mut() = mock.status;
    *response.headers_mut() = headers;
    response
}

/// HTTP handler for the capture proxy.
#[derive(Clone, Debug)]
pub struct CaptureHandler {
    pipeline: Pipeline,
    session: Option<SessionState>,
}

impl CaptureHandler {
    /// Creates a handler over the given pipeline.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            session: None,
        }
    }

    /// Returns the session attached to the current transaction, if any.
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Request-side processing: tag, capture, then mock or forward.
    pub async fn intercept_request(&mut self, req: Request<Body>) -> RequestOrResponse {
        let url = request_url(&req);
        let Some(session) = self.pipeline.tag(req.method(), &url) else {
            return RequestOrResponse::Request(req);
        };

        let (mut parts, body) = req.into_parts();
        let body_bytes = read_body(body, "request", session.sequence_id).await;

        self.pipeline
            .capture_request(
                &session,
                &parts.method,
                &parts.uri,
                parts.version,
                &parts.headers,
                &body_bytes,
            )
            .await;

        if let Some(mock) = self.pipeline.mock_response(&session, &parts.method) {
            let headers = mock_headers();
            self.pipeline
                .capture_response(
                    &session,
                    mock.status,
                    Version::HTTP_11,
                    &headers,
                    mock.body.as_bytes(),
                )
                .await;
            return RequestOrResponse::Response(build_mock_response(mock, headers));
        }

        // Capture and extraction need the plain body.
        parts
            .headers
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        self.session = Some(session);
        RequestOrResponse::Request(Request::from_parts(parts, bytes_to_body(body_bytes)))
    }

    /// Response-side processing: capture and extract, then pass through.
    pub async fn intercept_response(&mut self, res: Response<Body>) -> Response<Body> {
        let Some(session) = self.session.take() else {
            return res;
        };

        let (parts, body) = res.into_parts();
        let body_bytes = read_body(body, "response", session.sequence_id).await;

        self.pipeline
            .capture_response(
                &session,
                parts.status,
                parts.version,
                &parts.headers,
                &body_bytes,
            )
            .await;

        Response::from_parts(parts, bytes_to_body(body_bytes))
    }
}

impl HttpHandler for CaptureHandler {
    async fn handle_request(
        &mut self,
        _ctx: &HttpContext,
        req: Request<Body>,
    ) -> RequestOrResponse {
        self.intercept_request(req).await
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        self.intercept_response(res).await
    }
}
