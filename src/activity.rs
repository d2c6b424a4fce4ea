//! Activity transactions — bulk insert and removal of generated slide pages.
//!
//! DESIGN
//! ======
//! An activity is a cohort of generated pages `page:IA-01 .. page:IA-NN`,
//! each holding one locked, full-bleed image shape and the image asset it
//! references. Every change to a cohort is built as a single [`Transaction`]
//! per replica, so a replica either sees the whole cohort change or none of
//! it. Replicas are updated one after another; a replica that rejects its
//! batch does not stop the others, and the first rejection is reported once
//! every replica has been tried.
//!
//! Removal is irreversible: after the pages are gone each replica's undo
//! history is cleared, so undo cannot bring a half-cohort back.

#[cfg(test)]
#[path = "activity_test.rs"]
mod activity_test;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::camera::{CanvasSize, FitRequest};
use crate::error::ErrorCode;
use crate::ids::{
    AssetId, ImageRef, InvalidImageRef, MAX_ACTIVITY_PAGES, OccupantId, PageId, WHITEBOARD_PAGE_NAME,
};
use crate::slides::SlideError;
use crate::store::{Asset, Op, Page, ReplicatedStore, Shape, ShapeKind, StoreError, Transaction};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("activity upload needs at least one image")]
    EmptyUpload,
    #[error("activity upload of {count} images exceeds the {max}-page limit")]
    TooManyImages { count: usize, max: usize },
    #[error(transparent)]
    InvalidImage(#[from] InvalidImageRef),
    #[error("replica {occupant} rejected the activity batch: {source}")]
    Store { occupant: OccupantId, source: StoreError },
    #[error("no replica mounted for {0}")]
    ReplicaNotFound(OccupantId),
    #[error(transparent)]
    Slides(#[from] SlideError),
}

impl ErrorCode for ActivityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyUpload => "E_EMPTY_UPLOAD",
            Self::TooManyImages { .. } => "E_TOO_MANY_IMAGES",
            Self::InvalidImage(_) => "E_INVALID_IMAGE",
            Self::Store { source, .. } => source.error_code(),
            Self::ReplicaNotFound(_) => "E_REPLICA_NOT_FOUND",
            Self::Slides(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.retryable(),
            Self::Slides(e) => e.retryable(),
            _ => false,
        }
    }
}

/// A replica an activity operation touches.
pub type ReplicaTarget = (OccupantId, Arc<dyn ReplicatedStore>);

/// The pages an upload produced, in cohort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityCohort {
    pub pages: Vec<PageId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Replicas whose activity was removed and history cleared.
    pub replicas: usize,
    /// Activity pages deleted, summed over replicas.
    pub pages_removed: usize,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate raw image references before anything is mutated.
///
/// # Errors
///
/// [`ActivityError::EmptyUpload`] for an empty list,
/// [`ActivityError::TooManyImages`] past the cohort limit, or
/// [`ActivityError::InvalidImage`] for the first reference that is not an
/// absolute http(s) URL.
pub fn parse_images<S: AsRef<str>>(raw: &[S]) -> Result<Vec<ImageRef>, ActivityError> {
    check_cohort_size(raw.len())?;
    raw.iter()
        .map(|r| ImageRef::parse(r.as_ref()).map_err(ActivityError::from))
        .collect()
}

fn check_cohort_size(count: usize) -> Result<(), ActivityError> {
    if count == 0 {
        return Err(ActivityError::EmptyUpload);
    }
    if count > MAX_ACTIVITY_PAGES {
        return Err(ActivityError::TooManyImages { count, max: MAX_ACTIVITY_PAGES });
    }
    Ok(())
}

/// Page ids of a cohort of `count` pages.
#[must_use]
pub fn cohort_pages(count: usize) -> Vec<PageId> {
    (1..=u16::MAX).take(count).map(PageId::activity).collect()
}

// =============================================================================
// UPLOAD
// =============================================================================

/// Build the transaction that installs `images` as the activity cohort of
/// `store`.
///
/// Existing cohort pages are reused: their previous slide images are
/// replaced, annotations on them are kept. Cohort pages past the new length
/// are deleted with their content. The first page is selected with a locked,
/// fitted camera.
#[must_use]
pub fn build_upload(store: &dyn ReplicatedStore, images: &[ImageRef], canvas: CanvasSize) -> Transaction {
    let existing = store.pages();
    let live_assets: HashSet<AssetId> = store.assets().into_iter().map(|a| a.id).collect();
    let mut retired_assets = HashSet::new();
    let mut tx = Transaction::local();

    for stale in existing
        .iter()
        .filter(|p| p.is_activity() && p.activity_index().is_some_and(|i| usize::from(i) > images.len()))
    {
        let shapes = store.shapes_on_page(&stale.id);
        queue_shape_removal(&shapes, &live_assets, &mut retired_assets, &mut tx);
        tx.push(Op::DeletePage(stale.id.clone()));
    }

    for (index, image) in (1..=u16::MAX).zip(images) {
        let page_id = PageId::activity(index);
        if existing.iter().any(|p| p.id == page_id) {
            let old_images: Vec<Shape> = store
                .shapes_on_page(&page_id)
                .into_iter()
                .filter(|s| s.kind == ShapeKind::Image)
                .collect();
            queue_shape_removal(&old_images, &live_assets, &mut retired_assets, &mut tx);
        } else {
            tx.push(Op::CreatePage(Page::activity(index)));
        }
        let asset = Asset::slide_image(image, index, canvas);
        let shape = Shape::full_bleed_image(page_id, asset.id.clone(), canvas);
        tx.push(Op::CreateAsset(asset));
        tx.push(Op::CreateShape(shape));
    }

    tx.push(Op::SelectPage(PageId::activity(1)));
    tx.push(Op::SetCameraLocked(true));
    tx.push(Op::FitToContent(FitRequest::IMMEDIATE));
    tx
}

/// Install `images` as the activity cohort on every replica.
///
/// # Errors
///
/// Validation errors are returned before any replica is touched. A replica
/// that rejects its batch yields [`ActivityError::Store`] after the remaining
/// replicas have been updated.
pub fn upload(
    replicas: &[ReplicaTarget],
    images: &[ImageRef],
    canvas: CanvasSize,
) -> Result<ActivityCohort, ActivityError> {
    check_cohort_size(images.len())?;
    let mut first_failure = None;

    for (occupant, store) in replicas {
        let tx = build_upload(store.as_ref(), images, canvas);
        match store.commit(tx) {
            Ok(_) => debug!(%occupant, pages = images.len(), "activity installed"),
            Err(source) => {
                warn!(%occupant, error = %source, "activity upload rejected");
                if first_failure.is_none() {
                    first_failure = Some(ActivityError::Store { occupant: occupant.clone(), source });
                }
            }
        }
    }

    if let Some(err) = first_failure {
        return Err(err);
    }
    info!(replicas = replicas.len(), pages = images.len(), "activity uploaded");
    Ok(ActivityCohort { pages: cohort_pages(images.len()) })
}

// =============================================================================
// REMOVAL
// =============================================================================

/// Build the transaction that removes every activity page from `store`, or
/// `None` if it has none. Returns the removed page ids alongside.
#[must_use]
pub fn build_removal(store: &dyn ReplicatedStore) -> Option<(Transaction, Vec<PageId>)> {
    let pages = store.pages();
    let (activity, remaining): (Vec<&Page>, Vec<&Page>) = pages.iter().partition(|p| p.is_activity());
    if activity.is_empty() {
        return None;
    }

    let live_assets: HashSet<AssetId> = store.assets().into_iter().map(|a| a.id).collect();
    let shapes: Vec<Shape> = activity
        .iter()
        .flat_map(|p| store.shapes_on_page(&p.id))
        .collect();
    let mut tx = Transaction::local();
    queue_shape_removal(&shapes, &live_assets, &mut HashSet::new(), &mut tx);
    for page in &activity {
        tx.push(Op::DeletePage(page.id.clone()));
    }

    let current = store.current_page_id();
    if activity.iter().any(|p| p.id == current) {
        match remaining.first() {
            Some(page) => tx.push(Op::SelectPage(page.id.clone())),
            None => {
                let whiteboard = PageId::whiteboard();
                tx.push(Op::CreatePage(Page::board(whiteboard.clone(), WHITEBOARD_PAGE_NAME)));
                tx.push(Op::SelectPage(whiteboard));
            }
        }
    }
    tx.push(Op::FitToContent(FitRequest::FORCED));

    let removed = activity.iter().map(|p| p.id.clone()).collect();
    Some((tx, removed))
}

/// Remove the activity cohort from every replica and clear their history.
///
/// # Errors
///
/// A replica that rejects its removal yields [`ActivityError::Store`] after
/// the remaining replicas have been processed; its history is left intact.
pub fn remove(replicas: &[ReplicaTarget]) -> Result<RemovalReport, ActivityError> {
    let mut report = RemovalReport::default();
    let mut first_failure = None;

    for (occupant, store) in replicas {
        if let Some((tx, pages)) = build_removal(store.as_ref()) {
            if let Err(source) = store.commit(tx) {
                warn!(%occupant, error = %source, "activity removal rejected");
                if first_failure.is_none() {
                    first_failure = Some(ActivityError::Store { occupant: occupant.clone(), source });
                }
                continue;
            }
            report.pages_removed += pages.len();
        }
        store.clear_history();
        report.replicas += 1;
    }

    if let Some(err) = first_failure {
        return Err(err);
    }
    info!(replicas = report.replicas, pages = report.pages_removed, "activity removed");
    Ok(report)
}

/// Delete everything the user drew on the current page, keeping frames,
/// slide images, and locked shapes. Returns how many shapes were deleted.
///
/// # Errors
///
/// Propagates the store's rejection of the batch.
pub fn clear_page(store: &dyn ReplicatedStore) -> Result<usize, StoreError> {
    let current = store.current_page_id();
    let mut tx = Transaction::local();
    for shape in store.shapes_on_page(&current) {
        if !shape.locked && !matches!(shape.kind, ShapeKind::Frame | ShapeKind::Image) {
            tx.push(Op::DeleteShape(shape.id));
        }
    }
    let cleared = tx.ops().len();
    if cleared > 0 {
        store.commit(tx)?;
        debug!(page = %current, cleared, "page cleared");
    }
    Ok(cleared)
}

/// Queue removal of `shapes` (unlocking locked ones first) and then of the
/// assets they reference.
fn queue_shape_removal(
    shapes: &[Shape],
    live_assets: &HashSet<AssetId>,
    retired_assets: &mut HashSet<AssetId>,
    tx: &mut Transaction,
) {
    for shape in shapes.iter().filter(|s| s.locked) {
        tx.push(Op::UpdateShape(Shape { locked: false, ..shape.clone() }));
    }
    for shape in shapes {
        tx.push(Op::DeleteShape(shape.id.clone()));
    }
    for asset in shapes.iter().filter_map(|s| s.asset_id.as_ref()) {
        if live_assets.contains(asset) && retired_assets.insert(asset.clone()) {
            tx.push(Op::DeleteAsset(asset.clone()));
        }
    }
}
