//! The capture pipeline.
//!
//! [`Pipeline`] is what the proxy hooks call into. It is cheap to clone and
//! every clone shares the same registry and mock responder.
//!
//! ```text
//! request hook:  tag ─► capture_request ─► mock_response? ─┬─► short-circuit
//!                                                          └─► forward upstream
//! response hook: capture_response ─► (production, image, 200) ─► extract images
//! ```
//!
//! Nothing here returns an error to the hooks: failures are logged and the
//! transaction continues.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::{HeaderMap, Method, StatusCode, Uri, Version};
use tapline_core::{Mode, Settings};

use crate::capture;
use crate::image_extractor::save_inline_images;
use crate::mock::{ensure_default_template, load_placeholder_base64, MockResponder};
use crate::registry::{CaptureDirectory, CaptureRegistry};
use crate::session::{SessionState, SessionTagger};

/// Content type of mock responses.
pub const MOCK_CONTENT_TYPE: &str = "application/json";

/// A locally synthesized response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// Status code to return.
    pub status: StatusCode,
    /// JSON body.
    pub body: String,
}

/// Snapshot of pipeline state for operators.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// Current mode.
    pub mode: Mode,
    /// Active capture directory, if one has been created.
    pub active: Option<CaptureDirectory>,
    /// Sequence id the next captured transaction will get.
    pub next_sequence: u64,
    /// Host substring in scope.
    pub target_host: String,
    /// Image-generation URL marker.
    pub image_url_marker: String,
    /// Whether a mock template is loaded.
    pub template_loaded: bool,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mode:            {}", self.mode)?;
        match &self.active {
            Some(dir) => {
                let fallback = if dir.is_fallback { " (fallback)" } else { "" };
                writeln!(f, "capture dir:     {}{}", dir.path.display(), fallback)?;
                writeln!(
                    f,
                    "active since:    {}",
                    dir.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                )?;
            }
            None => writeln!(f, "capture dir:     (none)")?,
        }
        writeln!(f, "next sequence:   {:03}", self.next_sequence)?;
        writeln!(f, "target host:     {}", self.target_host)?;
        writeln!(f, "image marker:    {}", self.image_url_marker)?;
        write!(
            f,
            "mock template:   {}",
            if self.template_loaded {
                "loaded"
            } else {
                "built-in fallback"
            }
        )
    }
}

/// Shared capture pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<CaptureRegistry>,
    mock: Arc<MockResponder>,
}

impl Pipeline {
    /// Creates a pipeline from its parts.
    pub fn new(registry: Arc<CaptureRegistry>, mock: Arc<MockResponder>) -> Self {
        Self { registry, mock }
    }

    /// Builds a pipeline from settings.
    ///
    /// Writes the default mock template if none exists, loads the
    /// placeholder image, and leaves directory creation to the first
    /// rotation or captured request.
    pub fn from_settings(settings: Settings) -> Self {
        if let Err(e) = ensure_default_template(&settings.mock_template_path) {
            tracing::warn!("Could not write default mock template: {}", e);
        }
        let placeholder = load_placeholder_base64(&settings.placeholder_image_path);
        let mock = MockResponder::new(settings.mock_template_path.clone(), placeholder);

        Self::new(
            Arc::new(CaptureRegistry::new(settings)),
            Arc::new(mock),
        )
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<CaptureRegistry> {
        &self.registry
    }

    /// Returns the mock responder.
    pub fn mock_responder(&self) -> &Arc<MockResponder> {
        &self.mock
    }

    /// Returns the current settings.
    pub fn settings(&self) -> Arc<Settings> {
        self.registry.settings()
    }

    /// Returns the current mode.
    pub fn mode(&self) -> Mode {
        self.registry.mode()
    }

    /// Sets the mode. Idempotent; returns the previous mode.
    pub fn set_mode(&self, mode: Mode) -> Mode {
        self.registry.set_mode(mode)
    }

    /// Starts a new capture directory.
    pub fn rotate(&self) -> CaptureDirectory {
        self.registry.rotate()
    }

    /// Re-reads the mock template. Returns true if it was read.
    pub fn reload_template(&self) -> bool {
        let loaded = self.mock.reload_template();
        if loaded {
            tracing::info!("Mock template reloaded");
        } else {
            tracing::warn!("Mock template unavailable; built-in response will be served");
        }
        loaded
    }

    /// Replaces the settings and reloads the template from the new path.
    pub fn reload_settings(&self, settings: Settings) -> bool {
        if let Err(e) = ensure_default_template(&settings.mock_template_path) {
            tracing::warn!("Could not write default mock template: {}", e);
        }
        let template_path: PathBuf = settings.mock_template_path.clone();
        self.registry.replace_settings(settings);
        tracing::info!("Settings reloaded");
        self.mock.set_template_path(template_path)
    }

    /// Returns an operator-facing snapshot.
    pub fn status(&self) -> PipelineStatus {
        let settings = self.registry.settings();
        PipelineStatus {
            mode: self.registry.mode(),
            active: self.registry.active(),
            next_sequence: self.registry.peek_next_sequence(),
            target_host: settings.target_host.clone(),
            image_url_marker: settings.image_url_marker.clone(),
            template_loaded: self.mock.has_template(),
        }
    }

    /// Tags an outbound request; `None` means the transaction is not captured.
    pub fn tag(&self, method: &Method, url: &str) -> Option<SessionState> {
        SessionTagger::new(&self.registry).tag(method, url)
    }

    /// Persists the request side of a tagged transaction.
    pub async fn capture_request(
        &self,
        session: &SessionState,
        method: &Method,
        uri: &Uri,
        version: Version,
        headers: &HeaderMap,
        body: &[u8],
    ) {
        if let Err(e) = capture::write_request(session, method, uri, version, headers, body).await
        {
            tracing::warn!("Request capture #{:03} failed: {}", session.sequence_id, e);
        }
    }

    /// Returns a mock response if this transaction should be short-circuited.
    ///
    /// Applies only in mock mode, to POSTs flagged as image generation.
    pub fn mock_response(&self, session: &SessionState, method: &Method) -> Option<MockResponse> {
        if !self.registry.mode().is_mock()
            || !session.in_scope
            || !session.is_image_generation
            || *method != Method::POST
        {
            return None;
        }

        tracing::info!("Serving mock response for #{:03}", session.sequence_id);
        Some(MockResponse {
            status: StatusCode::OK,
            body: self.mock.body(),
        })
    }

    /// Persists the response side and, for successful production image
    /// calls, extracts inline images.
    pub async fn capture_response(
        &self,
        session: &SessionState,
        status: StatusCode,
        version: Version,
        headers: &HeaderMap,
        body: &[u8],
    ) {
        if let Err(e) = capture::write_response(session, status, version, headers, body).await {
            tracing::warn!("Response capture #{:03} failed: {}", session.sequence_id, e);
        }

        if self.registry.mode() != Mode::Production
            || !session.is_image_generation
            || status != StatusCode::OK
        {
            return;
        }

        match save_inline_images(&session.capture_dir, session.sequence_id, body).await {
            Ok(paths) if paths.is_empty() => {
                tracing::debug!("No inline images in response #{:03}", session.sequence_id);
            }
            Ok(paths) => {
                tracing::info!(
                    "Extracted {} image(s) from response #{:03}",
                    paths.len(),
                    session.sequence_id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Image extraction for #{:03} skipped: {}",
                    session.sequence_id,
                    e
                );
            }
        }
    }
}
