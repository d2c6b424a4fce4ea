//! Replicated document store contract.
//!
//! DESIGN
//! ======
//! Each occupant's board is a replica of an eventually-consistent document
//! store. The transport and merge semantics live outside this crate; what the
//! follow engine needs is captured by [`ReplicatedStore`]:
//!
//! - typed reads of pages, shapes, assets, and the per-replica camera
//! - atomic [`Transaction`]s: an ordered list of [`Op`]s that is applied as one
//!   unit and surfaces as exactly one [`Changeset`]
//! - filtered subscriptions (document vs session records, local vs remote
//!   origin)
//! - document-level undo/redo history
//!
//! Records are split into two scopes. Document records (pages, shapes,
//! assets) are shared with peers. Session records (this replica's instance
//! state, peers' current pages, presence) describe who is looking where.
//!
//! [`memory::MemoryStore`] is the in-process implementation.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::camera::{Bounds, Camera, CameraOptions, CanvasSize, FitRequest};
use crate::ids::{AssetId, ImageRef, OccupantId, PageId, ShapeId, activity_page_name};

// =============================================================================
// DOCUMENT RECORDS
// =============================================================================

/// Explicit tag distinguishing generated activity pages from ordinary boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageKind {
    Board,
    Activity { index: u16 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub name: String,
    pub kind: PageKind,
}

impl Page {
    #[must_use]
    pub fn board(id: PageId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), kind: PageKind::Board }
    }

    /// Generated activity page at 1-based `index`.
    #[must_use]
    pub fn activity(index: u16) -> Self {
        Self {
            id: PageId::activity(index),
            name: activity_page_name(index),
            kind: PageKind::Activity { index },
        }
    }

    /// Tagged as activity, or carrying the activity id convention (pages
    /// created by peers that predate the tag).
    #[must_use]
    pub fn is_activity(&self) -> bool {
        matches!(self.kind, PageKind::Activity { .. }) || self.id.has_activity_marker()
    }

    /// 1-based cohort position, from the tag or else the id convention.
    #[must_use]
    pub fn activity_index(&self) -> Option<u16> {
        match self.kind {
            PageKind::Activity { index } => Some(index),
            PageKind::Board => self.id.activity_index(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Image,
    Frame,
    Draw,
    Text,
    Geo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub page_id: PageId,
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub locked: bool,
    pub asset_id: Option<AssetId>,
}

impl Shape {
    /// Full-bleed locked image at the canvas origin.
    #[must_use]
    pub fn full_bleed_image(page_id: PageId, asset_id: AssetId, canvas: CanvasSize) -> Self {
        Self {
            id: ShapeId::generate(),
            page_id,
            kind: ShapeKind::Image,
            x: 0.0,
            y: 0.0,
            w: canvas.width,
            h: canvas.height,
            locked: true,
            asset_id: Some(asset_id),
        }
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.w, self.h)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub src: String,
    pub name: String,
    pub mime_type: String,
    pub w: f64,
    pub h: f64,
}

impl Asset {
    /// PNG slide image sized to the canvas.
    #[must_use]
    pub fn slide_image(image: &ImageRef, index: u16, canvas: CanvasSize) -> Self {
        Self {
            id: AssetId::generate(),
            src: image.as_str().to_owned(),
            name: format!("image-{index}"),
            mime_type: "image/png".to_owned(),
            w: canvas.width,
            h: canvas.height,
        }
    }
}

// =============================================================================
// SESSION RECORDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraState {
    pub camera: Camera,
    pub options: CameraOptions,
    pub last_fit: Option<FitRequest>,
}

/// This replica's own view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    pub current_page_id: PageId,
    pub camera: CameraState,
}

/// A peer's current page, as relayed by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerPage {
    pub peer_id: OccupantId,
    pub current_page_id: PageId,
}

/// A user's presence cursor, including the page they are on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: OccupantId,
    pub current_page_id: PageId,
}

// =============================================================================
// CHANGESETS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Record {
    Page(Page),
    Shape(Shape),
    Asset(Asset),
    Instance(InstanceState),
    PeerPage(PeerPage),
    Presence(Presence),
}

impl Record {
    #[must_use]
    pub fn scope(&self) -> RecordScope {
        match self {
            Self::Page(_) | Self::Shape(_) | Self::Asset(_) => RecordScope::Document,
            Self::Instance(_) | Self::PeerPage(_) | Self::Presence(_) => RecordScope::Session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    Document,
    Session,
}

/// Who caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// This replica's user or code running in this process.
    Local,
    /// A peer, delivered by the transport.
    Remote,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    All,
    Document,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginFilter {
    All,
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeFilter {
    pub scope: ChangeScope,
    pub origin: OriginFilter,
}

impl ChangeFilter {
    pub const ALL: Self = Self { scope: ChangeScope::All, origin: OriginFilter::All };

    #[must_use]
    pub fn new(scope: ChangeScope, origin: OriginFilter) -> Self {
        Self { scope, origin }
    }

    /// Narrow `changeset` to what this filter lets through, or `None` if
    /// nothing remains.
    #[must_use]
    pub fn apply(&self, changeset: &Changeset) -> Option<Changeset> {
        let origin_ok = match self.origin {
            OriginFilter::All => true,
            OriginFilter::Local => changeset.origin == Origin::Local,
            OriginFilter::Remote => changeset.origin == Origin::Remote,
        };
        if !origin_ok {
            return None;
        }
        let wanted = |record: &Record| match self.scope {
            ChangeScope::All => true,
            ChangeScope::Document => record.scope() == RecordScope::Document,
            ChangeScope::Session => record.scope() == RecordScope::Session,
        };
        let narrowed = Changeset {
            origin: changeset.origin,
            added: changeset.added.iter().filter(|r| wanted(r)).cloned().collect(),
            updated: changeset
                .updated
                .iter()
                .filter(|(_, after)| wanted(after))
                .cloned()
                .collect(),
            removed: changeset.removed.iter().filter(|r| wanted(r)).cloned().collect(),
        };
        if narrowed.is_empty() { None } else { Some(narrowed) }
    }
}

/// Everything one committed transaction changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub origin: Origin,
    pub added: Vec<Record>,
    /// `(before, after)` pairs.
    pub updated: Vec<(Record, Record)>,
    pub removed: Vec<Record>,
}

impl Changeset {
    #[must_use]
    pub fn empty(origin: Origin) -> Self {
        Self { origin, added: Vec::new(), updated: Vec::new(), removed: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Whether any page, shape, or asset changed.
    #[must_use]
    pub fn touches_document(&self) -> bool {
        self.added
            .iter()
            .chain(self.updated.iter().map(|(_, after)| after))
            .chain(self.removed.iter())
            .any(|r| r.scope() == RecordScope::Document)
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    CreatePage(Page),
    RenamePage { id: PageId, name: String },
    /// Deletes the page and any shapes still on it. Locked shapes block it.
    DeletePage(PageId),
    SelectPage(PageId),
    CreateAsset(Asset),
    DeleteAsset(AssetId),
    CreateShape(Shape),
    UpdateShape(Shape),
    /// Locked shapes cannot be deleted; unlock them first.
    DeleteShape(ShapeId),
    SetCameraOptions(CameraOptions),
    SetCameraLocked(bool),
    FitToContent(FitRequest),
    PutPeerPage(PeerPage),
    PutPresence(Presence),
    RemovePresence(OccupantId),
}

/// An ordered batch of operations applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    origin: Origin,
    record_history: bool,
    ops: Vec<Op>,
}

impl Transaction {
    /// A change made by this replica, recorded in undo history.
    #[must_use]
    pub fn local() -> Self {
        Self { origin: Origin::Local, record_history: true, ops: Vec::new() }
    }

    /// A change delivered from a peer. Never recorded in local history.
    #[must_use]
    pub fn remote() -> Self {
        Self { origin: Origin::Remote, record_history: false, ops: Vec::new() }
    }

    /// Keep this transaction out of undo history.
    #[must_use]
    pub fn ignoring_history(mut self) -> Self {
        self.record_history = false;
        self
    }

    #[must_use]
    pub fn with(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    #[must_use]
    pub fn records_history(&self) -> bool {
        self.record_history
    }

    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("page not found: {0}")]
    PageNotFound(PageId),
    #[error("page already exists: {0}")]
    PageExists(PageId),
    #[error("shape not found: {0}")]
    ShapeNotFound(ShapeId),
    #[error("shape already exists: {0}")]
    ShapeExists(ShapeId),
    #[error("shape is locked: {0}")]
    ShapeLocked(ShapeId),
    #[error("asset not found: {0}")]
    AssetNotFound(AssetId),
    #[error("asset already exists: {0}")]
    AssetExists(AssetId),
    #[error("current page would not exist after commit: {0}")]
    DanglingCurrentPage(PageId),
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

impl crate::error::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PageNotFound(_) => "E_PAGE_NOT_FOUND",
            Self::PageExists(_) => "E_PAGE_EXISTS",
            Self::ShapeNotFound(_) => "E_SHAPE_NOT_FOUND",
            Self::ShapeExists(_) => "E_SHAPE_EXISTS",
            Self::ShapeLocked(_) => "E_SHAPE_LOCKED",
            Self::AssetNotFound(_) => "E_ASSET_NOT_FOUND",
            Self::AssetExists(_) => "E_ASSET_EXISTS",
            Self::DanglingCurrentPage(_) => "E_DANGLING_PAGE",
            Self::Rejected(_) => "E_STORE_REJECTED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

pub type Listener = Arc<dyn Fn(&Changeset) + Send + Sync>;

/// Live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// One occupant's replica of the shared board.
///
/// Implementations deliver changesets to listeners synchronously from
/// `commit`, after releasing any internal lock, so listeners may commit
/// further transactions.
pub trait ReplicatedStore: Send + Sync {
    /// All pages in display order.
    fn pages(&self) -> Vec<Page>;

    fn page(&self, id: &PageId) -> Option<Page>;

    fn current_page_id(&self) -> PageId;

    fn shapes_on_page(&self, id: &PageId) -> Vec<Shape>;

    fn assets(&self) -> Vec<Asset>;

    fn camera(&self) -> CameraState;

    /// Apply `tx` atomically.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any op is invalid; no op is applied then.
    fn commit(&self, tx: Transaction) -> Result<Changeset, StoreError>;

    fn subscribe(&self, filter: ChangeFilter, listener: Listener) -> Subscription;

    /// Revert the last recorded local transaction. Returns whether anything
    /// was undone.
    fn undo(&self) -> bool;

    fn redo(&self) -> bool;

    fn clear_history(&self);

    fn has_page(&self, id: &PageId) -> bool {
        self.page(id).is_some()
    }

    /// Whether `id` is a generated activity page, using the record's tag when
    /// the page is known locally and the id convention otherwise.
    fn is_activity_page(&self, id: &PageId) -> bool {
        self.page(id)
            .map_or_else(|| id.has_activity_marker(), |page| page.is_activity())
    }
}
