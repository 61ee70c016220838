//! Mock responses for image-generation calls.
//!
//! In mock mode, matching requests are answered locally: the placeholder
//! image (base64) is substituted into a JSON template and returned instead of
//! contacting the upstream API. A template that is missing or does not parse
//! after substitution is replaced by a built-in document of the same shape, so
//! a mock response is always produced. A template without the token is served
//! as written.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::error::CaptureError;

/// Token in the template replaced by the placeholder image's base64 text.
pub const PLACEHOLDER_TOKEN: &str = "PLACEHOLDER_IMAGE_BASE64";

/// Model version reported by the built-in mock document.
pub const MOCK_MODEL_VERSION: &str = "gemini-2.5-flash-image-preview";

/// 1x1 PNG used when no placeholder image is available on disk.
const EMBEDDED_PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, //
    0x1F, 0x15, 0xC4, 0x89, //
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, // IDAT
    0x78, 0xDA, 0x63, 0x64, 0x60, 0xF8, 0x5F, 0x0F, 0x00, 0x02, 0x87, 0x01, 0x80, //
    0xEB, 0x47, 0xBA, 0x92, //
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND
    0xAE, 0x42, 0x60, 0x82,
];

static EMBEDDED_PLACEHOLDER_B64: Lazy<String> =
    Lazy::new(|| STANDARD.encode(EMBEDDED_PLACEHOLDER_PNG));

/// Builds a Gemini-shaped response carrying `image_b64` as inline data.
fn response_document(image_b64: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "parts": [
                    { "text": "Here is your generated image." },
                    { "inlineData": { "mimeType": "image/png", "data": image_b64 } }
                ],
                "role": "model"
            },
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {
            "promptTokenCount": 12,
            "candidatesTokenCount": 1290,
            "totalTokenCount": 1302
        },
        "modelVersion": MOCK_MODEL_VERSION
    })
}

/// Returns the default template text, with the token in the image slot.
pub fn default_template() -> String {
    // The token is a plain string value, so the pretty printer emits it verbatim.
    serde_json::to_string_pretty(&response_document(PLACEHOLDER_TOKEN))
        .unwrap_or_else(|_| format!("{{\"data\":\"{}\"}}", PLACEHOLDER_TOKEN))
}

/// Writes the default template to `path` if nothing exists there yet.
///
/// Returns true if a file was written.
pub fn ensure_default_template(path: &Path) -> Result<bool, CaptureError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CaptureError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, default_template()).map_err(|source| CaptureError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Wrote default mock template to {:?}", path);
    Ok(true)
}

/// Loads the placeholder image as base64, using the embedded image if the
/// file cannot be read or is empty.
pub fn load_placeholder_base64(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => {
            tracing::info!("Loaded placeholder image {:?} ({} bytes)", path, bytes.len());
            STANDARD.encode(bytes)
        }
        Ok(_) => {
            tracing::warn!("Placeholder image {:?} is empty, using embedded image", path);
            EMBEDDED_PLACEHOLDER_B64.clone()
        }
        Err(e) => {
            tracing::warn!(
                "Failed to read placeholder image {:?}: {}; using embedded image",
                path,
                e
            );
            EMBEDDED_PLACEHOLDER_B64.clone()
        }
    }
}

/// Substitutes `image_b64` for every token occurrence and checks the result
/// is well-formed JSON.
pub fn render_template(template: &str, image_b64: &str) -> Result<String, CaptureError> {
    let rendered = template.replace(PLACEHOLDER_TOKEN, image_b64);
    serde_json::from_str::<Value>(&rendered)?;
    Ok(rendered)
}

/// Returns the built-in mock document embedding `image_b64`.
pub fn fallback_body(image_b64: &str) -> String {
    response_document(image_b64).to_string()
}

#[derive(Debug)]
struct MockAssets {
    template_path: PathBuf,
    template: Option<String>,
    placeholder_b64: String,
}

/// Produces mock image-generation responses.
#[derive(Debug)]
pub struct MockResponder {
    assets: RwLock<MockAssets>,
}

impl MockResponder {
    /// Creates a responder from a template file and a base64 placeholder.
    ///
    /// The template is read immediately; a read failure is logged and the
    /// built-in document is served until a successful reload.
    pub fn new(template_path: impl Into<PathBuf>, placeholder_b64: String) -> Self {
        let template_path = template_path.into();
        let template = read_template(&template_path);
        Self {
            assets: RwLock::new(MockAssets {
                template_path,
                template,
                placeholder_b64,
            }),
        }
    }

    /// Creates a responder from on-disk template and placeholder paths.
    pub fn from_paths(template_path: &Path, placeholder_path: &Path) -> Self {
        Self::new(template_path, load_placeholder_base64(placeholder_path))
    }

    /// Re-reads the template from its configured path.
    ///
    /// Returns true if the template was read.
    pub fn reload_template(&self) -> bool {
        let mut assets = self.assets.write();
        let template = read_template(&assets.template_path);
        assets.template = template;
        assets.template.is_some()
    }

    /// Points the responder at a new template path and reloads it.
    pub fn set_template_path(&self, template_path: impl Into<PathBuf>) -> bool {
        let mut assets = self.assets.write();
        let template_path = template_path.into();
        assets.template = read_template(&template_path);
        assets.template_path = template_path;
        assets.template.is_some()
    }

    /// Returns true if a template is currently loaded.
    pub fn has_template(&self) -> bool {
        self.assets.read().template.is_some()
    }

    /// Renders the mock response body. Never fails.
    pub fn body(&self) -> String {
        let assets = self.assets.read();
        let Some(template) = assets.template.as_deref() else {
            return fallback_body(&assets.placeholder_b64);
        };

        match render_template(template, &assets.placeholder_b64) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    "Mock template {:?} unusable ({}); serving built-in response",
                    assets.template_path,
                    e
                );
                fallback_body(&assets.placeholder_b64)
            }
        }
    }
}

fn read_template(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => {
            tracing::debug!("Loaded mock template {:?}", path);
            Some(text)
        }
        Err(e) => {
            tracing::warn!("Failed to read mock template {:?}: {}", path, e);
            None
        }
    }
}
