//! Page-follow synchronization engine for a classroom whiteboard.
//!
//! One moderator and many participants each hold a replica of a shared,
//! eventually-consistent document store. This crate sits on top of those
//! replicas and decides, for every local and remote mutation, whether a
//! replica's visible page and camera must be forced to track a leader. It also
//! owns the bulk "activity" edits that insert or remove a cohort of generated
//! slide pages across every replica the local process controls.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`ids`] | Page/shape/asset/occupant identifiers, roles, view contexts |
//! | [`camera`] | Camera state, lock options, fit-to-content math |
//! | [`store`] | Replicated store contract and the in-memory [`store::memory::MemoryStore`] |
//! | [`sync_guard`] | Loop-prevention state for one replica |
//! | [`policy`] | Pure page-follow decision table |
//! | [`follower`] | Per-replica driver: changesets in, navigations out |
//! | [`activity`] | Atomic upload/removal of generated activity pages |
//! | [`coordinator`] | Occupant → replica map, fan-out, preview lifecycle |
//! | [`slides`] | Slide-link import through the image-description service |
//! | [`config`] | Environment-driven tuning knobs |
//! | [`error`] | Shared error-code trait |

pub mod activity;
pub mod camera;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod follower;
pub mod ids;
pub mod policy;
pub mod slides;
pub mod store;
pub mod sync_guard;
