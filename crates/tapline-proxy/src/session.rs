//! Per-transaction session tagging.
//!
//! The tagger looks at an outbound request once, before it is forwarded, and
//! decides whether the transaction is captured. In-scope transactions get a
//! [`SessionState`] that travels with the transaction until its response has
//! been captured.

use std::path::PathBuf;

use hyper::Method;

use crate::registry::{CaptureDirectory, CaptureRegistry};

/// Correlation state for one captured transaction.
///
/// Exactly one exists per in-scope transaction; it is never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Always true for a tagged transaction.
    pub in_scope: bool,
    /// Sequence id shared by every artifact of this transaction.
    pub sequence_id: u64,
    /// True if the URL contains the image-generation marker.
    pub is_image_generation: bool,
    /// Directory the sequence id was issued for.
    pub capture_dir: PathBuf,
}

impl SessionState {
    /// Returns the artifact path for `suffix`, e.g. `request_body.txt`.
    pub fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.capture_dir.join(artifact_name(self.sequence_id, suffix))
    }
}

/// Returns the artifact file name for a sequence id, zero-padded to three digits.
pub fn artifact_name(sequence_id: u64, suffix: &str) -> String {
    format!("{:03}_{}", sequence_id, suffix)
}

/// Decides capture scope for outbound requests.
#[derive(Debug, Clone, Copy)]
pub struct SessionTagger<'a> {
    registry: &'a CaptureRegistry,
}

impl<'a> SessionTagger<'a> {
    /// Creates a tagger over the given registry.
    pub fn new(registry: &'a CaptureRegistry) -> Self {
        Self { registry }
    }

    /// Tags a request, reserving a sequence id if it is in scope.
    ///
    /// Returns `None` for out-of-scope requests and for CONNECT tunnels, which
    /// carry no payload of their own.
    pub fn tag(&self, method: &Method, url: &str) -> Option<SessionState> {
        if *method == Method::CONNECT {
            return None;
        }

        let settings = self.registry.settings();
        if !settings.is_in_scope(url) {
            return None;
        }

        let reservation = self.registry.reserve();
        let is_image_generation = settings.is_image_generation(url);

        tracing::debug!(
            "Tagged {} {} as #{:03} (image generation: {})",
            method,
            url,
            reservation.sequence_id,
            is_image_generation
        );

        Some(session_for(
            &reservation.directory,
            reservation.sequence_id,
            is_image_generation,
        ))
    }
}

fn session_for(
    directory: &CaptureDirectory,
    sequence_id: u64,
    is_image_generation: bool,
) -> SessionState {
    SessionState {
        in_scope: true,
        sequence_id,
        is_image_generation,
        capture_dir: directory.path.clone(),
    }
}
