//! Follower — drives page following for one mounted replica.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! store changeset ──► classify ──► FollowEvent ──► policy::decide ──► Decision
//!                                                      ▲                 │
//!                                              SyncGuard (locked)        │
//!                                                                        ▼
//!              camera-only decision: commit now ◄──────────┬──── navigation?
//!                                                          │
//!              navigation: begin_sync now, then on tokio:  ▼
//!                sleep(frame_delay) → select+lock+fit → commit_sync
//!                sleep(settle_window) → settle(token)
//! ```
//!
//! The follower subscribes once, with no scope or origin filter, and
//! classifies each changeset itself. Camera-only changes (including the ones
//! the follower makes) produce no event, which is what terminates the
//! navigate → notify → decide cycle.
//!
//! The store holds the listener and the listener holds only a weak reference
//! back to the follower state, so dropping the [`Follower`] tears everything
//! down: the subscription is cancelled and pending navigations find nothing
//! to upgrade.

#[cfg(test)]
#[path = "follower_test.rs"]
mod follower_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::camera::FitRequest;
use crate::config::FollowConfig;
use crate::ids::{OccupantId, PageId, Role, ViewContext};
use crate::policy::{self, CameraLock, Decision, FollowEvent, FollowInput};
use crate::store::{
    ChangeFilter, Changeset, Op, Origin, Record, ReplicatedStore, StoreError, Subscription, Transaction,
};
use crate::sync_guard::{SyncGuard, SyncToken};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("page following needs a tokio runtime: {0}")]
    NoRuntime(String),
}

impl crate::error::ErrorCode for FollowError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoRuntime(_) => "E_NO_RUNTIME",
        }
    }
}

/// Who a replica belongs to and how it is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaProfile {
    /// Occupant whose board this replica is.
    pub occupant: OccupantId,
    /// Role of the local process.
    pub role: Role,
    pub context: ViewContext,
    /// Occupant whose page changes this replica follows. `None` follows any
    /// peer in the room.
    pub leader: Option<OccupantId>,
}

struct Shared {
    profile: ReplicaProfile,
    store: Arc<dyn ReplicatedStore>,
    guard: Mutex<SyncGuard>,
    frame_delay: Duration,
    settle_window: Duration,
    runtime: Handle,
}

/// A mounted replica's follow driver.
pub struct Follower {
    shared: Arc<Shared>,
    _subscription: Subscription,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

impl Follower {
    /// Subscribe to `store` and start following.
    ///
    /// # Errors
    ///
    /// Returns [`FollowError::NoRuntime`] when called outside a tokio runtime;
    /// deferred navigations are scheduled on the caller's runtime.
    pub fn mount(
        store: Arc<dyn ReplicatedStore>,
        profile: ReplicaProfile,
        config: &FollowConfig,
    ) -> Result<Self, FollowError> {
        let runtime = Handle::try_current().map_err(|e| FollowError::NoRuntime(e.to_string()))?;
        info!(
            occupant = %profile.occupant,
            role = %profile.role,
            context = ?profile.context,
            "follower mounted"
        );

        let shared = Arc::new(Shared {
            profile,
            store: Arc::clone(&store),
            guard: Mutex::new(SyncGuard::new()),
            frame_delay: config.frame_delay,
            settle_window: config.settle_window,
            runtime,
        });
        let weak = Arc::downgrade(&shared);
        let subscription = store.subscribe(
            ChangeFilter::ALL,
            Arc::new(move |changeset: &Changeset| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_changeset(changeset);
                }
            }),
        );

        Ok(Self { shared, _subscription: subscription })
    }

    #[must_use]
    pub fn profile(&self) -> &ReplicaProfile {
        &self.shared.profile
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ReplicatedStore> {
        &self.shared.store
    }

    #[must_use]
    pub fn sync_in_flight(&self) -> bool {
        lock(&self.shared.guard).in_flight()
    }

    #[must_use]
    pub fn last_synced(&self) -> Option<PageId> {
        lock(&self.shared.guard).last_synced().cloned()
    }

    /// Navigate to `page` right away, lock and fit, and record it as synced.
    /// Returns `false` if the page does not exist.
    ///
    /// # Errors
    ///
    /// Propagates the store's rejection of the navigation.
    pub fn jump_to(&self, page: &PageId) -> Result<bool, StoreError> {
        let store = &self.shared.store;
        if !store.has_page(page) {
            return Ok(false);
        }
        let tx = Transaction::local()
            .ignoring_history()
            .with(Op::SelectPage(page.clone()))
            .with(Op::SetCameraLocked(true))
            .with(Op::FitToContent(FitRequest::IMMEDIATE));
        store.commit(tx)?;
        lock(&self.shared.guard).commit_sync(page.clone());
        debug!(occupant = %self.shared.profile.occupant, %page, "jumped to page");
        Ok(true)
    }

    /// Show `page` when it exists here, then lock the camera for whatever page
    /// ends up shown. Used when a preview opens.
    ///
    /// # Errors
    ///
    /// Propagates the store's rejection of the change.
    pub fn adopt(&self, page: Option<&PageId>) -> Result<(), StoreError> {
        let store = &self.shared.store;
        let mut tx = Transaction::local().ignoring_history();
        let shown = match page {
            Some(page) if store.has_page(page) => {
                tx.push(Op::SelectPage(page.clone()));
                page.clone()
            }
            _ => store.current_page_id(),
        };
        let is_activity = store.is_activity_page(&shown);
        if policy::derived_camera_lock(is_activity, self.shared.profile.context) {
            tx.push(Op::SetCameraLocked(true));
            tx.push(Op::FitToContent(FitRequest::IMMEDIATE));
        } else {
            tx.push(Op::SetCameraLocked(false));
        }
        store.commit(tx)?;
        Ok(())
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl Shared {
    fn on_changeset(self: &Arc<Self>, changeset: &Changeset) {
        for (event, source) in classify(changeset) {
            self.handle(&event, source.as_ref());
        }
    }

    fn handle(self: &Arc<Self>, event: &FollowEvent, source: Option<&OccupantId>) {
        let store = &self.store;
        let current = store.current_page_id();
        let current_is_activity = store.is_activity_page(&current);
        let target_exists = event.observed_page().is_some_and(|page| store.has_page(page));
        let from_leader = match (&self.profile.leader, source) {
            (Some(leader), Some(source)) => leader == source,
            _ => true,
        };

        let (decision, token) = {
            let mut guard = lock(&self.guard);
            let decision = policy::decide(&FollowInput {
                role: self.profile.role,
                context: self.profile.context,
                event,
                current_page: &current,
                current_is_activity,
                target_exists,
                from_leader,
                guard: &guard,
            });
            let token = decision.navigate_to.as_ref().map(|page| guard.begin_sync(page));
            (decision, token)
        };

        if decision.is_noop() {
            return;
        }
        debug!(occupant = %self.profile.occupant, ?event, ?decision, "follow decision");
        match (decision.navigate_to.clone(), token) {
            (Some(page), Some(token)) => self.schedule_navigation(page, decision, token),
            _ => self.apply_camera(&decision),
        }
    }

    fn schedule_navigation(self: &Arc<Self>, page: PageId, decision: Decision, token: SyncToken) {
        let weak = Arc::downgrade(self);
        let frame_delay = self.frame_delay;
        let settle_window = self.settle_window;
        self.runtime.spawn(async move {
            tokio::time::sleep(frame_delay).await;
            {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                shared.apply_navigation(&page, &decision);
            }
            tokio::time::sleep(settle_window).await;
            if let Some(shared) = weak.upgrade() {
                lock(&shared.guard).settle(token);
            }
        });
    }

    fn apply_navigation(&self, page: &PageId, decision: &Decision) {
        let occupant = &self.profile.occupant;
        if !self.store.has_page(page) {
            debug!(%occupant, %page, "follow target vanished before frame boundary");
            return;
        }
        let tx = with_camera_ops(
            Transaction::local()
                .ignoring_history()
                .with(Op::SelectPage(page.clone())),
            decision,
        );
        match self.store.commit(tx) {
            Ok(_) => {
                if decision.commit_sync {
                    lock(&self.guard).commit_sync(page.clone());
                }
                debug!(%occupant, %page, "followed leader");
            }
            Err(e) => warn!(%occupant, %page, error = %e, "forced navigation rejected"),
        }
    }

    fn apply_camera(&self, decision: &Decision) {
        let tx = with_camera_ops(Transaction::local().ignoring_history(), decision);
        if tx.is_empty() {
            return;
        }
        if let Err(e) = self.store.commit(tx) {
            warn!(occupant = %self.profile.occupant, error = %e, "camera update rejected");
        }
    }
}

fn with_camera_ops(mut tx: Transaction, decision: &Decision) -> Transaction {
    match decision.camera {
        CameraLock::Lock => tx.push(Op::SetCameraLocked(true)),
        CameraLock::Unlock => tx.push(Op::SetCameraLocked(false)),
        CameraLock::Keep => {}
    }
    if let Some(fit) = decision.fit {
        tx.push(Op::FitToContent(fit));
    }
    tx
}

/// Turn one changeset into follow events, each tagged with the occupant that
/// caused it when the record names one.
fn classify(changeset: &Changeset) -> Vec<(FollowEvent, Option<OccupantId>)> {
    let remote = changeset.origin == Origin::Remote;
    let mut events = Vec::new();

    for (before, after) in &changeset.updated {
        match (before, after) {
            (Record::Instance(b), Record::Instance(a)) if b.current_page_id != a.current_page_id => {
                let page = a.current_page_id.clone();
                let event = if remote {
                    FollowEvent::RemotePageChanged { page }
                } else {
                    FollowEvent::LocalPageChanged { page }
                };
                events.push((event, None));
            }
            (Record::PeerPage(b), Record::PeerPage(a)) if remote && b.current_page_id != a.current_page_id => {
                events.push((
                    FollowEvent::RemotePageChanged { page: a.current_page_id.clone() },
                    Some(a.peer_id.clone()),
                ));
            }
            (Record::Presence(b), Record::Presence(a)) if remote && b.current_page_id != a.current_page_id => {
                events.push((
                    FollowEvent::RemotePresenceChanged {
                        occupant: a.user_id.clone(),
                        page: a.current_page_id.clone(),
                    },
                    Some(a.user_id.clone()),
                ));
            }
            _ => {}
        }
    }

    if remote {
        for record in &changeset.added {
            match record {
                Record::PeerPage(peer) => events.push((
                    FollowEvent::RemotePageChanged { page: peer.current_page_id.clone() },
                    Some(peer.peer_id.clone()),
                )),
                Record::Presence(presence) => events.push((
                    FollowEvent::RemotePresenceChanged {
                        occupant: presence.user_id.clone(),
                        page: presence.current_page_id.clone(),
                    },
                    Some(presence.user_id.clone()),
                )),
                _ => {}
            }
        }
    }

    if events.is_empty() && changeset.touches_document() {
        events.push((FollowEvent::ContentChanged { origin: changeset.origin }, None));
    }
    events
}

fn lock(mutex: &Mutex<SyncGuard>) -> MutexGuard<'_, SyncGuard> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
