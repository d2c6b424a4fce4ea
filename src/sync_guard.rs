//! Loop-prevention state for one replica's page following.
//!
//! DESIGN
//! ======
//! A forced navigation changes the replica's current page, which the replica
//! then observes as a change of its own. Without a guard that change could
//! trigger another forced navigation, and so on. The guard tracks:
//!
//! - `in_flight`: the token of the forced navigation currently settling. At
//!   most one exists; while it does, nothing else is synced.
//! - `last_synced`: the page the last successful forced navigation reached.
//!   Observing it again is not a reason to navigate.
//!
//! Settling is keyed by token so a late settle callback from an older sync
//! can never clear a newer one.

#[cfg(test)]
#[path = "sync_guard_test.rs"]
mod sync_guard_test;

use tracing::debug;

use crate::ids::PageId;

/// Identifies one forced navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncToken(u64);

#[derive(Debug, Default)]
pub struct SyncGuard {
    last_synced: Option<PageId>,
    in_flight: Option<SyncToken>,
    next_token: u64,
}

impl SyncGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a forced navigation from `current` to `candidate` is allowed.
    #[must_use]
    pub fn should_sync(&self, candidate: &PageId, current: &PageId) -> bool {
        if self.in_flight.is_some() || candidate == current {
            return false;
        }
        self.last_synced.as_ref() != Some(candidate)
    }

    /// Mark a forced navigation toward `page` as in flight.
    pub fn begin_sync(&mut self, page: &PageId) -> SyncToken {
        self.next_token += 1;
        let token = SyncToken(self.next_token);
        if let Some(previous) = self.in_flight.replace(token) {
            debug!(?previous, ?token, %page, "sync started while another was settling");
        }
        token
    }

    /// Clear the in-flight flag if `token` is still the one in flight.
    pub fn settle(&mut self, token: SyncToken) -> bool {
        if self.in_flight == Some(token) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Record that a forced navigation reached `page`.
    pub fn commit_sync(&mut self, page: PageId) {
        self.last_synced = Some(page);
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn last_synced(&self) -> Option<&PageId> {
        self.last_synced.as_ref()
    }
}
