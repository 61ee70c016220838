//! Inline image extraction from generative API responses.
//!
//! Successful image-generation responses embed their output as base64 inside
//! the JSON body:
//!
//! ```json
//! {"candidates": [{"content": {"parts": [
//!     {"text": "..."},
//!     {"inlineData": {"mimeType": "image/png", "data": "iVBORw0..."}}
//! ]}}]}
//! ```
//!
//! Each part carrying `inlineData.data` is decoded and written next to the
//! transaction's other artifacts as `{seq:03}_generated_image_{part}.{ext}`.
//! Missing fields at any level mean "no image here", never an error.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use crate::error::CaptureError;
use crate::session::artifact_name;

/// Extension used when the part has no usable `mimeType`.
const DEFAULT_EXTENSION: &str = "png";

/// An image decoded from one response part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Index of the part within `content.parts`.
    pub part_index: usize,
    /// File extension derived from the part's mime type.
    pub extension: String,
    /// Decoded image bytes.
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Returns the artifact file name for this image.
    pub fn file_name(&self, sequence_id: u64) -> String {
        artifact_name(
            sequence_id,
            &format!("generated_image_{}.{}", self.part_index, self.extension),
        )
    }
}

/// Resolves a file extension from a mime type such as `image/jpeg`.
///
/// Takes the text after the first `/` (ignoring any `;` parameters) and
/// falls back to `png` when that is empty or not a plain token.
pub fn extension_for_mime(mime_type: Option<&str>) -> String {
    let Some(mime) = mime_type else {
        return DEFAULT_EXTENSION.to_string();
    };
    let Some((_, subtype)) = mime.split_once('/') else {
        return DEFAULT_EXTENSION.to_string();
    };

    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    let usable = !subtype.is_empty()
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');

    if usable {
        subtype.to_ascii_lowercase()
    } else {
        DEFAULT_EXTENSION.to_string()
    }
}

/// Returns the `content.parts` array of the first candidate, if present.
fn first_candidate_parts(json: &Value) -> Option<&Vec<Value>> {
    json.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()
}

/// Decodes every inline image in a response body.
///
/// Fails only if the body is not JSON. Parts whose payload is not valid
/// base64 are skipped with a warning.
pub fn extract_inline_images(body: &[u8]) -> Result<Vec<InlineImage>, CaptureError> {
    let json: Value = serde_json::from_slice(body)?;

    let Some(parts) = first_candidate_parts(&json) else {
        return Ok(Vec::new());
    };

    let mut images = Vec::new();
    for (part_index, part) in parts.iter().enumerate() {
        let Some(inline) = part.get("inlineData") else {
            continue;
        };
        let Some(data) = inline.get("data").and_then(Value::as_str) else {
            continue;
        };

        let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        match STANDARD.decode(cleaned.as_bytes()) {
            Ok(bytes) => images.push(InlineImage {
                part_index,
                extension: extension_for_mime(inline.get("mimeType").and_then(Value::as_str)),
                data: bytes,
            }),
            Err(e) => {
                tracing::warn!("Skipping part {}: invalid base64 payload: {}", part_index, e);
            }
        }
    }

    Ok(images)
}

/// Extracts inline images from `body` and writes them into `dir`.
///
/// Returns the paths written. Images that fail to write are logged and
/// skipped so one bad part does not lose the rest.
pub async fn save_inline_images(
    dir: &Path,
    sequence_id: u64,
    body: &[u8],
) -> Result<Vec<PathBuf>, CaptureError> {
    let images = extract_inline_images(body)?;
    let mut written = Vec::with_capacity(images.len());

    for image in images {
        let path = dir.join(image.file_name(sequence_id));
        match tokio::fs::write(&path, &image.data).await {
            Ok(()) => {
                tracing::info!(
                    "Saved generated image {:?} ({} bytes)",
                    path,
                    image.data.len()
                );
                written.push(path);
            }
            Err(e) => {
                tracing::warn!("Failed to write generated image {:?}: {}", path, e);
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // 1x1 PNG signature prefix is enough to compare bytes.
    fn fake_png() -> Vec<u8> {
        vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01, 0x02]
    }

    fn response_with_parts(parts: &str) -> String {
        format!(r#"{{"candidates":[{{"content":{{"parts":{}}}}}]}}"#, parts)
    }

    #[test]
    fn extension_from_mime_type() {
        assert_eq!(extension_for_mime(Some("image/jpeg")), "jpeg");
        assert_eq!(extension_for_mime(Some("image/webp; q=1")), "webp");
        assert_eq!(extension_for_mime(Some("image/svg+xml")), "svg+xml");
        assert_eq!(extension_for_mime(None), "png");
        assert_eq!(extension_for_mime(Some("jpeg")), "png");
        assert_eq!(extension_for_mime(Some("image/")), "png");
        assert_eq!(extension_for_mime(Some("image/../../etc")), "png");
    }

    #[test]
    fn extracts_single_jpeg_part() {
        let png = fake_png();
        let body = response_with_parts(&format!(
            r#"[{{"inlineData":{{"mimeType":"image/jpeg","data":"{}"}}}}]"#,
            STANDARD.encode(&png)
        ));

        let images = extract_inline_images(body.as_bytes()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].part_index, 0);
        assert_eq!(images[0].extension, "jpeg");
        assert_eq!(images[0].data, png);
        assert_eq!(images[0].file_name(1), "001_generated_image_0.jpeg");
    }

    #[test]
    fn keeps_part_index_of_mixed_parts() {
        let b64 = STANDARD.encode(fake_png());
        let body = response_with_parts(&format!(
            r#"[{{"text":"here you go"}},{{"inlineData":{{"data":"{b64}"}}}},{{"inlineData":{{"mimeType":"image/webp"}}}},{{"inlineData":{{"mimeType":"image/webp","data":"{b64}"}}}}]"#
        ));

        let images = extract_inline_images(body.as_bytes()).unwrap();
        let names: Vec<String> = images.iter().map(|i| i.file_name(12)).collect();
        assert_eq!(
            names,
            vec!["012_generated_image_1.png", "012_generated_image_3.webp"]
        );
    }

    #[test]
    fn missing_structure_yields_nothing() {
        for body in [
            r#"{}"#,
            r#"{"candidates":[]}"#,
            r#"{"candidates":"nope"}"#,
            r#"{"candidates":[{"finishReason":"SAFETY"}]}"#,
            r#"{"candidates":[{"content":{}}]}"#,
            r#"{"candidates":[{"content":{"parts":{}}}]}"#,
            r#"[1, 2, 3]"#,
        ] {
            assert!(extract_inline_images(body.as_bytes()).unwrap().is_empty(), "{}", body);
        }
    }

    #[test]
    fn only_first_candidate_is_read() {
        let b64 = STANDARD.encode(fake_png());
        let body = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"text":"a"}}]}}}},{{"content":{{"parts":[{{"inlineData":{{"data":"{b64}"}}}}]}}}}]}}"#
        );
        assert!(extract_inline_images(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn invalid_base64_part_is_skipped() {
        let b64 = STANDARD.encode(fake_png());
        let body = response_with_parts(&format!(
            r#"[{{"inlineData":{{"data":"!!!not base64!!!"}}}},{{"inlineData":{{"data":"{b64}"}}}}]"#
        ));

        let images = extract_inline_images(body.as_bytes()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].part_index, 1);
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(matches!(
            extract_inline_images(b"<html>502</html>"),
            Err(CaptureError::Json(_))
        ));
    }

    #[tokio::test]
    async fn save_writes_decoded_bytes() {
        let temp = TempDir::new().unwrap();
        let png = fake_png();
        let body = response_with_parts(&format!(
            r#"[{{"inlineData":{{"mimeType":"image/jpeg","data":"{}"}}}}]"#,
            STANDARD.encode(&png)
        ));

        let written = save_inline_images(temp.path(), 3, body.as_bytes())
            .await
            .unwrap();

        assert_eq!(written, vec![temp.path().join("003_generated_image_0.jpeg")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), png);
    }

    #[tokio::test]
    async fn save_invalid_json_writes_nothing() {
        let temp = TempDir::new().unwrap();
        assert!(save_inline_images(temp.path(), 1, b"not json").await.is_err());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
