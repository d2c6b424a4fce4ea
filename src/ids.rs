//! Identifiers, roles, and view contexts.
//!
//! Page ids for generated activity pages follow a fixed convention
//! (`page:IA-01`, `page:IA-02`, ...) so that peers agree on ids without
//! coordination. The convention is only a fallback for recognising activity
//! pages: records carry an explicit [`crate::store::PageKind`] tag.

#[cfg(test)]
#[path = "ids_test.rs"]
mod ids_test;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Substring that marks a page id as a generated activity page.
pub const ACTIVITY_MARKER: &str = "page:IA";

const ACTIVITY_ID_PREFIX: &str = "page:IA-";
const ACTIVITY_NAME_PREFIX: &str = "IA-";

/// Largest cohort that keeps two-digit names lexically ordered.
pub const MAX_ACTIVITY_PAGES: usize = 99;

/// Name a fresh store gives its first page.
pub const DEFAULT_PAGE_NAME: &str = "Page 1";
/// Name of the ordinary drawing page in a classroom.
pub const WHITEBOARD_PAGE_NAME: &str = "Whiteboard";
const WHITEBOARD_PAGE_ID: &str = "page:whiteboard";

// =============================================================================
// PAGE / SHAPE / ASSET IDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id used when a classroom needs a fresh whiteboard page.
    #[must_use]
    pub fn whiteboard() -> Self {
        Self(WHITEBOARD_PAGE_ID.to_owned())
    }

    /// Id of the generated activity page at 1-based `index`.
    #[must_use]
    pub fn activity(index: u16) -> Self {
        Self(format!("{ACTIVITY_ID_PREFIX}{index:02}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id follows the generated-activity naming convention.
    #[must_use]
    pub fn has_activity_marker(&self) -> bool {
        self.0.contains(ACTIVITY_MARKER)
    }

    /// Parse the 1-based cohort index back out of a convention id.
    #[must_use]
    pub fn activity_index(&self) -> Option<u16> {
        let digits = self.0.strip_prefix(ACTIVITY_ID_PREFIX)?;
        match digits.parse::<u16>() {
            Ok(index) if index > 0 => Some(index),
            _ => None,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Display name of the generated activity page at 1-based `index`.
#[must_use]
pub fn activity_page_name(index: u16) -> String {
    format!("{ACTIVITY_NAME_PREFIX}{index:02}")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(format!("shape:{}", Uuid::new_v4()))
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(format!("asset:{}", Uuid::new_v4()))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// OCCUPANTS
// =============================================================================

/// Case-normalized identity of a room occupant.
///
/// The conferencing roster reports display names with arbitrary casing; two
/// names that differ only in case are the same occupant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccupantId(String);

impl OccupantId {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OccupantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OccupantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Role the local process acts in, or an occupant's roster role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Participant,
}

impl Role {
    /// Parse a roster role string. Roles other than moderator/participant
    /// (observers, recorders, bots) are `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "moderator" => Some(Self::Moderator),
            "participant" => Some(Self::Participant),
            _ => None,
        }
    }

    /// The role whose boards this role may preview.
    #[must_use]
    pub fn counterpart(self) -> Self {
        match self {
            Self::Moderator => Self::Participant,
            Self::Participant => Self::Moderator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moderator => f.write_str("moderator"),
            Self::Participant => f.write_str("participant"),
        }
    }
}

/// Roster entry as reported by the conferencing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub name: String,
    pub role: String,
}

impl Occupant {
    #[must_use]
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self { name: name.into(), role: role.into() }
    }

    #[must_use]
    pub fn id(&self) -> OccupantId {
        OccupantId::new(&self.name)
    }
}

/// How a replica is being shown in the local process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewContext {
    /// The local occupant's own board.
    Solo,
    /// Small always-following thumbnail of another occupant's board.
    SidebarPreview,
    /// Enlarged, interactive view of another occupant's board.
    FullscreenPreview,
}

// =============================================================================
// IMAGE REFERENCES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid image reference '{reference}': {reason}")]
pub struct InvalidImageRef {
    pub reference: String,
    pub reason: String,
}

/// Absolute http(s) URL of one slide image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Validate an image reference.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidImageRef`] if the reference is not an absolute URL or
    /// uses a scheme other than http/https.
    pub fn parse(raw: &str) -> Result<Self, InvalidImageRef> {
        let reference = raw.trim();
        let url = reqwest::Url::parse(reference).map_err(|e| InvalidImageRef {
            reference: reference.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InvalidImageRef {
                reference: reference.to_owned(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(Self(url.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
