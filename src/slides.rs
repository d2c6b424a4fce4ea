//! Slide import — resolve a slide-deck link into ordered image references.
//!
//! The description service renders every slide of a presentation to an image
//! and answers `GET {base}/process/{presentation_id}` with
//! `{"imageUrls": ["/path/1.png", ...]}`. Paths are relative to the service
//! base URL and come back in slide order.
//!
//! ERROR HANDLING
//! ==============
//! Every failure maps to a [`SlideError`]; [`SlideError::user_message`] gives
//! the text shown to the person who pasted the link.

#[cfg(test)]
#[path = "slides_test.rs"]
mod slides_test;

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::FollowConfig;
use crate::error::ErrorCode;
use crate::ids::ImageRef;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const MIN_BARE_ID_LEN: usize = 10;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    /// The pasted text is not a recognisable presentation link.
    #[error("not a presentation link: {0}")]
    InvalidLink(String),

    /// The request to the description service failed.
    #[error("slide service request failed: {0}")]
    Http(String),

    /// The description service returned a non-success status.
    #[error("slide service returned status {status}")]
    Status { status: u16 },

    /// The response body did not carry a usable image list.
    #[error("slide service response malformed: {0}")]
    MalformedResponse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for SlideError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidLink(_) => "E_INVALID_LINK",
            Self::Http(_) => "E_SLIDE_HTTP",
            Self::Status { .. } => "E_SLIDE_STATUS",
            Self::MalformedResponse(_) => "E_SLIDE_MALFORMED",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::MalformedResponse(_) | Self::Status { status: 429 | 500..=599 }
        )
    }
}

impl SlideError {
    /// Text for the upload dialog.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidLink(_) => "Invalid Google Slides link. Please enter a valid URL.",
            _ => "Failed to process the presentation. Please try again.",
        }
    }
}

// =============================================================================
// LINK PARSING
// =============================================================================

/// Pull the presentation id out of a slide-deck link.
///
/// Accepts `https://docs.google.com/presentation/d/<id>/...` links, and bare
/// ids made of `[A-Za-z0-9_-]` that are at least ten characters long.
///
/// # Errors
///
/// Returns [`SlideError::InvalidLink`] for anything else.
pub fn extract_presentation_id(link: &str) -> Result<String, SlideError> {
    let link = link.trim();
    if is_bare_id(link) {
        return Ok(link.to_owned());
    }

    let invalid = || SlideError::InvalidLink(link.to_owned());
    let url = reqwest::Url::parse(link).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
    segments
        .windows(3)
        .find_map(|w| match w {
            ["presentation", "d", id] if is_id_chars(id) && !id.is_empty() => Some((*id).to_owned()),
            _ => None,
        })
        .ok_or_else(invalid)
}

fn is_bare_id(raw: &str) -> bool {
    raw.len() >= MIN_BARE_ID_LEN && is_id_chars(raw)
}

fn is_id_chars(raw: &str) -> bool {
    raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// =============================================================================
// SOURCE
// =============================================================================

/// Something that can turn a presentation id into slide images.
#[async_trait::async_trait]
pub trait SlideSource: Send + Sync {
    /// Image references for each slide, in slide order.
    async fn fetch_images(&self, presentation_id: &str) -> Result<Vec<ImageRef>, SlideError>;
}

/// HTTP client for the image-description service.
pub struct SlideClient {
    http: reqwest::Client,
    base_url: String,
}

impl SlideClient {
    /// # Errors
    ///
    /// Returns [`SlideError::HttpClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SlideError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .build()
            .map_err(|e| SlideError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// See [`SlideClient::new`].
    pub fn from_config(config: &FollowConfig) -> Result<Self, SlideError> {
        Self::new(&config.file_server_url, config.fetch_timeout)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl SlideSource for SlideClient {
    async fn fetch_images(&self, presentation_id: &str) -> Result<Vec<ImageRef>, SlideError> {
        let url = format!("{}/process/{presentation_id}", self.base_url);
        debug!(%url, "fetching slide images");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SlideError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlideError::Status { status: status.as_u16() });
        }
        let text = response
            .text()
            .await
            .map_err(|e| SlideError::Http(e.to_string()))?;
        let images = parse_process_response(&self.base_url, &text)?;
        info!(presentation_id, slides = images.len(), "slide images resolved");
        Ok(images)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResponse {
    image_urls: Option<Vec<String>>,
}

/// Parse a `/process` response body into absolute image references.
///
/// # Errors
///
/// Returns [`SlideError::MalformedResponse`] if the body is not JSON, the
/// `imageUrls` list is missing, empty, or holds non-strings, or a joined URL
/// is not a valid image reference.
pub fn parse_process_response(base_url: &str, body: &str) -> Result<Vec<ImageRef>, SlideError> {
    let parsed: ProcessResponse =
        serde_json::from_str(body).map_err(|e| SlideError::MalformedResponse(e.to_string()))?;
    let paths = parsed
        .image_urls
        .filter(|urls| !urls.is_empty())
        .ok_or_else(|| SlideError::MalformedResponse("imageUrls missing or empty".into()))?;

    let base = base_url.trim_end_matches('/');
    paths
        .iter()
        .map(|path| {
            ImageRef::parse(&format!("{base}{path}")).map_err(|e| SlideError::MalformedResponse(e.to_string()))
        })
        .collect()
}
