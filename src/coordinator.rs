//! Coordinator — owns every replica the local process has mounted.
//!
//! DESIGN
//! ======
//! The local process mounts one replica for its own board (solo) and, for
//! each occupant it watches, a sidebar preview replica. At most one
//! fullscreen preview is open at a time. Each mounted replica gets a
//! [`Follower`]; dropping the [`ReplicaHandle`] that owns it stops following.
//!
//! The occupant map has a single writer (mount/unmount) and is read by the
//! fan-out operations. It sits behind a tokio `RwLock` so the coordinator can
//! be cloned into tasks; guards are never held across an `.await`.

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_test;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::activity::{self, ActivityCohort, ActivityError, RemovalReport, ReplicaTarget};
use crate::camera::{CameraOptions, FitRequest};
use crate::config::FollowConfig;
use crate::error::ErrorCode;
use crate::follower::{FollowError, Follower, ReplicaProfile};
use crate::ids::{
    DEFAULT_PAGE_NAME, ImageRef, Occupant, OccupantId, PageId, Role, ViewContext, WHITEBOARD_PAGE_NAME,
};
use crate::slides::{self, SlideSource};
use crate::store::{Op, ReplicatedStore, StoreError, Transaction};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Follow(#[from] FollowError),
    #[error("mount setup rejected: {0}")]
    Store(#[from] StoreError),
}

impl ErrorCode for CoordinatorError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Follow(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Follow(e) => e.retryable(),
            Self::Store(e) => e.retryable(),
        }
    }
}

/// A mounted replica and the follower driving it.
#[derive(Clone)]
pub struct ReplicaHandle {
    occupant: OccupantId,
    context: ViewContext,
    store: Arc<dyn ReplicatedStore>,
    follower: Arc<Follower>,
}

impl ReplicaHandle {
    #[must_use]
    pub fn occupant(&self) -> &OccupantId {
        &self.occupant
    }

    #[must_use]
    pub fn context(&self) -> ViewContext {
        self.context
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ReplicatedStore> {
        &self.store
    }

    #[must_use]
    pub fn follower(&self) -> &Follower {
        &self.follower
    }

    fn target(&self) -> ReplicaTarget {
        (self.occupant.clone(), Arc::clone(&self.store))
    }
}

impl std::fmt::Debug for ReplicaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaHandle")
            .field("occupant", &self.occupant)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct MultiReplicaCoordinator {
    local: OccupantId,
    role: Role,
    config: FollowConfig,
    leader: Option<OccupantId>,
    replicas: Arc<RwLock<HashMap<OccupantId, ReplicaHandle>>>,
    preview: Arc<RwLock<Option<ReplicaHandle>>>,
}

// =============================================================================
// MOUNT
// =============================================================================

impl MultiReplicaCoordinator {
    #[must_use]
    pub fn new(local: &str, role: Role, config: FollowConfig) -> Self {
        Self {
            local: OccupantId::new(local),
            role,
            config,
            leader: None,
            replicas: Arc::new(RwLock::new(HashMap::new())),
            preview: Arc::new(RwLock::new(None)),
        }
    }

    /// Only page moves from `leader` drive the solo replica. Without one, a
    /// solo replica follows any peer in the room.
    #[must_use]
    pub fn with_leader(mut self, leader: &str) -> Self {
        self.leader = Some(OccupantId::new(leader));
        self
    }

    #[must_use]
    pub fn local(&self) -> &OccupantId {
        &self.local
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    #[must_use]
    pub fn leader(&self) -> Option<&OccupantId> {
        self.leader.as_ref()
    }

    /// Prepare `store` for `context`, start following, and register it.
    ///
    /// Solo and sidebar replicas are registered under `occupant`; a
    /// fullscreen preview is only mounted (see [`Self::open_preview`]).
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::Store`] if the store rejects the mount-time setup,
    /// [`CoordinatorError::Follow`] outside a tokio runtime.
    pub async fn mount(
        &self,
        occupant: &str,
        context: ViewContext,
        store: Arc<dyn ReplicatedStore>,
    ) -> Result<ReplicaHandle, CoordinatorError> {
        let handle = self.prepare(OccupantId::new(occupant), context, store)?;
        if context != ViewContext::FullscreenPreview {
            self.replicas
                .write()
                .await
                .insert(handle.occupant.clone(), handle.clone());
        }
        Ok(handle)
    }

    fn prepare(
        &self,
        occupant: OccupantId,
        context: ViewContext,
        store: Arc<dyn ReplicatedStore>,
    ) -> Result<ReplicaHandle, CoordinatorError> {
        let mut setup = Transaction::local().ignoring_history();
        let pages = store.pages();
        if !pages.iter().any(|p| p.name == WHITEBOARD_PAGE_NAME) {
            if let Some(page) = pages.iter().find(|p| p.name == DEFAULT_PAGE_NAME) {
                setup.push(Op::RenamePage { id: page.id.clone(), name: WHITEBOARD_PAGE_NAME.to_owned() });
            }
        }
        match context {
            ViewContext::Solo => setup.push(Op::SetCameraLocked(true)),
            ViewContext::SidebarPreview => {
                setup.push(Op::SetCameraOptions(CameraOptions::classroom(self.config.canvas)));
                setup.push(Op::FitToContent(FitRequest::FORCED));
            }
            ViewContext::FullscreenPreview => {}
        }
        if !setup.is_empty() {
            store.commit(setup)?;
        }

        let leader = match context {
            ViewContext::Solo => self.leader.clone(),
            ViewContext::SidebarPreview | ViewContext::FullscreenPreview => Some(occupant.clone()),
        };
        let profile = ReplicaProfile { occupant: occupant.clone(), role: self.role, context, leader };
        let follower = Follower::mount(Arc::clone(&store), profile, &self.config)?;

        if context == ViewContext::Solo && self.role == Role::Participant {
            let first = PageId::activity(1);
            if follower.jump_to(&first)? {
                debug!(%occupant, page = %first, "joined running activity");
            }
        }

        info!(%occupant, ?context, "replica mounted");
        Ok(ReplicaHandle { occupant, context, store, follower: Arc::new(follower) })
    }

    /// Insert or replace the replica registered for `occupant`.
    pub async fn register_replica(&self, occupant: &str, handle: ReplicaHandle) {
        let occupant = OccupantId::new(occupant);
        if self.replicas.write().await.insert(occupant.clone(), handle).is_some() {
            debug!(%occupant, "replica replaced");
        }
    }

    /// Unmount the replica registered for `occupant`. Returns whether one was
    /// registered.
    pub async fn unregister_replica(&self, occupant: &OccupantId) -> bool {
        let removed = self.replicas.write().await.remove(occupant);
        if removed.is_some() {
            info!(%occupant, "replica unmounted");
        }
        removed.is_some()
    }

    pub async fn replica(&self, occupant: &OccupantId) -> Option<ReplicaHandle> {
        self.replicas.read().await.get(occupant).cloned()
    }

    /// Registered occupants, sorted.
    pub async fn occupant_ids(&self) -> Vec<OccupantId> {
        let mut ids: Vec<OccupantId> = self.replicas.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Occupants from `roster` whose boards this role may preview, in
    /// first-seen order with case-insensitive duplicates collapsed.
    #[must_use]
    pub fn previewable(&self, roster: &[Occupant]) -> Vec<OccupantId> {
        let wanted = self.role.counterpart();
        let mut seen = HashSet::new();
        roster
            .iter()
            .filter(|o| Role::parse(&o.role) == Some(wanted))
            .map(Occupant::id)
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

// =============================================================================
// PREVIEW
// =============================================================================

impl MultiReplicaCoordinator {
    /// Open a fullscreen preview of `occupant`'s board on `store`.
    ///
    /// The preview shows a one-time snapshot of the page `occupant`'s
    /// registered replica is on right now. After that only the follow rules
    /// move it, so a moderator's preview stays put while a participant's
    /// preview tracks the moderator. An already open preview is closed first.
    ///
    /// # Errors
    ///
    /// See [`Self::mount`].
    pub async fn open_preview(
        &self,
        occupant: &OccupantId,
        store: Arc<dyn ReplicatedStore>,
    ) -> Result<ReplicaHandle, CoordinatorError> {
        let snapshot = self
            .replicas
            .read()
            .await
            .get(occupant)
            .map(|source| source.store.current_page_id());

        let handle = self.prepare(occupant.clone(), ViewContext::FullscreenPreview, store)?;
        handle.follower.adopt(snapshot.as_ref())?;

        if let Some(previous) = self.preview.write().await.replace(handle.clone()) {
            debug!(occupant = %previous.occupant, "preview replaced");
        }
        info!(%occupant, page = ?snapshot, "preview opened");
        Ok(handle)
    }

    /// Close the fullscreen preview. Returns whether one was open.
    pub async fn close_preview(&self) -> bool {
        match self.preview.write().await.take() {
            Some(handle) => {
                info!(occupant = %handle.occupant, "preview closed");
                true
            }
            None => false,
        }
    }

    pub async fn previewing(&self) -> Option<OccupantId> {
        self.preview.read().await.as_ref().map(|h| h.occupant.clone())
    }
}

// =============================================================================
// ACTIVITY FAN-OUT
// =============================================================================

impl MultiReplicaCoordinator {
    /// Install `images` as the activity on every registered replica, then call
    /// `on_complete` once with the resulting cohort.
    ///
    /// # Errors
    ///
    /// See [`activity::parse_images`] and [`activity::upload`]; `on_complete`
    /// is not called on error.
    pub async fn upload<S: AsRef<str>>(
        &self,
        images: &[S],
        on_complete: impl FnOnce(&ActivityCohort),
    ) -> Result<ActivityCohort, ActivityError> {
        let images = activity::parse_images(images)?;
        self.upload_refs(&images, on_complete).await
    }

    /// Resolve a slide-deck link through `source` and upload its slides.
    ///
    /// # Errors
    ///
    /// [`ActivityError::Slides`] if the link is invalid or the slides cannot
    /// be fetched (nothing is mutated), otherwise as [`Self::upload`].
    pub async fn upload_from_link(
        &self,
        source: &dyn SlideSource,
        link: &str,
        on_complete: impl FnOnce(&ActivityCohort),
    ) -> Result<ActivityCohort, ActivityError> {
        let presentation_id = slides::extract_presentation_id(link)?;
        let images = source.fetch_images(&presentation_id).await?;
        self.upload_refs(&images, on_complete).await
    }

    async fn upload_refs(
        &self,
        images: &[ImageRef],
        on_complete: impl FnOnce(&ActivityCohort),
    ) -> Result<ActivityCohort, ActivityError> {
        let targets = self.targets().await;
        let cohort = activity::upload(&targets, images, self.config.canvas)?;
        on_complete(&cohort);
        Ok(cohort)
    }

    /// Remove the activity from every registered replica.
    ///
    /// # Errors
    ///
    /// See [`activity::remove`].
    pub async fn remove_activity(&self) -> Result<RemovalReport, ActivityError> {
        let targets = self.targets().await;
        activity::remove(&targets)
    }

    /// Clear user drawings from the current page of `occupant`'s replica.
    ///
    /// # Errors
    ///
    /// [`ActivityError::ReplicaNotFound`] if nothing is registered for
    /// `occupant`, [`ActivityError::Store`] if the store rejects the batch.
    pub async fn clear_current_page(&self, occupant: &OccupantId) -> Result<usize, ActivityError> {
        let handle = self
            .replica(occupant)
            .await
            .ok_or_else(|| ActivityError::ReplicaNotFound(occupant.clone()))?;
        activity::clear_page(handle.store.as_ref())
            .map_err(|source| ActivityError::Store { occupant: occupant.clone(), source })
    }

    /// Registered replicas by occupant id. The fullscreen preview shares its
    /// room with the occupant's sidebar replica and is left out.
    async fn targets(&self) -> Vec<ReplicaTarget> {
        let mut targets: Vec<ReplicaTarget> = self
            .replicas
            .read()
            .await
            .values()
            .map(ReplicaHandle::target)
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        targets
    }
}
