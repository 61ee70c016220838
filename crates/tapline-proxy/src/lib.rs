//! Tapline Proxy - MITM capture of generative-AI API traffic.
//!
//! This crate sits between a client and a generative API (Gemini by default)
//! and durably records every transaction to the target host. Image-generation
//! calls can optionally be answered locally with a deterministic mock.
//!
//! ## Features
//!
//! - Generates a root CA on first run; per-host certificates on the fly
//! - Captures request/response metadata and bodies with a per-directory
//!   sequence number
//! - Extracts inline base64 images from successful generation responses
//! - Mock mode short-circuits image-generation POSTs from a JSON template
//! - Never fails a transaction because capture failed
//!
//! ## Architecture
//!
//! ```text
//! Client Request → Proxy → Tag (target host?) ──No──► Passthrough
//!                                 │ Yes
//!                                 ▼
//!                          Capture request
//!                                 │
//!                   ┌─────────────┴─────────────┐
//!                   │ Mock + image POST         │ otherwise
//!                   ▼                           ▼
//!             Mock response              Forward upstream
//!                                               │
//!                                               ▼
//!                                        Capture response
//!                                               │
//!                                               ▼
//!                                 Extract images (production, 200)
//! ```

mod ca;
pub mod capture;
mod error;
mod handler;
pub mod image_extractor;
pub mod mock;
pub mod pipeline;
mod proxy;
pub mod registry;
pub mod session;

pub use ca::{CaManager, CaManagerError};
pub use error::{CaptureError, ProxyError, Result};
pub use handler::{request_url, CaptureHandler, MOCK_MARKER_HEADER};
pub use image_extractor::{extract_inline_images, InlineImage};
pub use mock::{MockResponder, PLACEHOLDER_TOKEN};
pub use pipeline::{MockResponse, Pipeline, PipelineStatus};
pub use proxy::{ProxyConfig, ProxyHandle, ProxyServer};
pub use registry::{CaptureDirectory, CaptureRegistry, Reservation};
pub use session::{SessionState, SessionTagger};
pub use tapline_core::{Mode, Settings};
