//! Page-follow policy — one typed event in, one decision out.
//!
//! DESIGN
//! ======
//! Rules are evaluated top to bottom; the first that matches wins.
//!
//! 1. Sidebar previews mirror every page their occupant visits: navigate if
//!    the guard allows and the page exists, always keep the camera locked and
//!    fitted.
//! 2. Participants (solo or fullscreen) follow their leader's page: navigate,
//!    lock, fit, and record the page as synced.
//! 3. A moderator at their own board who navigates onto an activity page gets
//!    an unlocked camera so they can annotate the slide.
//! 4. Any replica on an activity page gets a locked, fitted camera.
//! 5. Any replica on an ordinary page gets an unlocked camera, unless a
//!    forced navigation is still settling.
//!
//! Rule 3 takes precedence over rule 4, so a moderator's own activity page is
//! the one place where an activity page is shown unlocked.
//!
//! Local edits that are not navigations never re-derive the camera: the user
//! is drawing, not moving.

#[cfg(test)]
#[path = "policy_test.rs"]
mod policy_test;

use crate::camera::FitRequest;
use crate::ids::{OccupantId, PageId, Role, ViewContext};
use crate::store::Origin;
use crate::sync_guard::SyncGuard;

/// Observed change, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowEvent {
    /// This replica's current page changed through a local action.
    LocalPageChanged { page: PageId },
    /// A peer's current page changed.
    RemotePageChanged { page: PageId },
    /// A user's presence moved to another page.
    RemotePresenceChanged { occupant: OccupantId, page: PageId },
    /// Anything else that touched the document.
    ContentChanged { origin: Origin },
}

impl FollowEvent {
    /// The page this event points at, if any.
    #[must_use]
    pub fn observed_page(&self) -> Option<&PageId> {
        match self {
            Self::LocalPageChanged { page }
            | Self::RemotePageChanged { page }
            | Self::RemotePresenceChanged { page, .. } => Some(page),
            Self::ContentChanged { .. } => None,
        }
    }

    fn is_remote_page(&self) -> bool {
        matches!(self, Self::RemotePageChanged { .. } | Self::RemotePresenceChanged { .. })
    }
}

/// Everything [`decide`] needs, gathered by the caller.
#[derive(Debug)]
pub struct FollowInput<'a> {
    pub role: Role,
    pub context: ViewContext,
    pub event: &'a FollowEvent,
    pub current_page: &'a PageId,
    pub current_is_activity: bool,
    /// Whether the event's observed page exists in this replica.
    pub target_exists: bool,
    /// Whether the event came from the replica's leader. Only presence events
    /// can come from someone else.
    pub from_leader: bool,
    pub guard: &'a SyncGuard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraLock {
    Lock,
    Unlock,
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub navigate_to: Option<PageId>,
    pub camera: CameraLock,
    pub fit: Option<FitRequest>,
    /// Record `navigate_to` as synced once the navigation lands.
    pub commit_sync: bool,
}

impl Decision {
    #[must_use]
    pub fn none() -> Self {
        Self { navigate_to: None, camera: CameraLock::Keep, fit: None, commit_sync: false }
    }

    fn locked_fit(navigate_to: Option<PageId>) -> Self {
        Self {
            navigate_to,
            camera: CameraLock::Lock,
            fit: Some(FitRequest::IMMEDIATE),
            commit_sync: false,
        }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.navigate_to.is_none() && self.camera == CameraLock::Keep && self.fit.is_none()
    }
}

/// Camera lock implied by the current page and view context alone.
#[must_use]
pub fn derived_camera_lock(current_is_activity: bool, context: ViewContext) -> bool {
    current_is_activity || context == ViewContext::SidebarPreview
}

/// Apply the decision table to one event.
#[must_use]
pub fn decide(input: &FollowInput<'_>) -> Decision {
    let event = input.event;

    if input.context == ViewContext::SidebarPreview {
        let navigate_to = event
            .observed_page()
            .filter(|_| input.from_leader && input.target_exists)
            .filter(|page| input.guard.should_sync(page, input.current_page))
            .cloned();
        return Decision::locked_fit(navigate_to);
    }

    if input.role == Role::Participant && event.is_remote_page() && input.from_leader {
        if let Some(page) = event.observed_page() {
            if input.target_exists && input.guard.should_sync(page, input.current_page) {
                return Decision { commit_sync: true, ..Decision::locked_fit(Some(page.clone())) };
            }
        }
    }

    match event {
        FollowEvent::LocalPageChanged { .. }
            if input.role == Role::Moderator
                && input.context == ViewContext::Solo
                && input.current_is_activity =>
        {
            return Decision {
                navigate_to: None,
                camera: CameraLock::Unlock,
                fit: Some(FitRequest::IMMEDIATE),
                commit_sync: false,
            };
        }
        FollowEvent::ContentChanged { origin: Origin::Local } => return Decision::none(),
        _ => {}
    }

    if input.current_is_activity {
        return Decision::locked_fit(None);
    }
    if input.guard.in_flight() {
        return Decision::none();
    }
    Decision { camera: CameraLock::Unlock, ..Decision::none() }
}
