//! In-process [`ReplicatedStore`].
//!
//! DESIGN
//! ======
//! A commit clones the current document and session state, applies every op
//! to the clone, validates the result, and only then swaps it in. A failing
//! op therefore leaves the store untouched. The changeset is computed by
//! diffing the before/after states, so ops that change nothing produce no
//! notification.
//!
//! Listeners are invoked after the state lock is released. A listener may
//! commit to the same store from inside its callback.
//!
//! HISTORY
//! =======
//! Each recorded local commit pushes the document part of its changeset onto
//! the undo stack. Undo applies the inverse of that changeset to the current
//! document rather than restoring a snapshot, so remote edits made in the
//! meantime survive.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{
    Asset, CameraState, ChangeFilter, ChangeScope, Changeset, InstanceState, Listener, Op, Origin, OriginFilter, Page,
    PeerPage, Presence, Record, ReplicatedStore, Shape, StoreError, Subscription, Transaction,
};
use crate::camera::{Bounds, Camera, CameraOptions, CanvasSize};
use crate::ids::{DEFAULT_PAGE_NAME, PageId};

const DEFAULT_PAGE_ID: &str = "page:page";
const DEFAULT_VIEWPORT_WIDTH: f64 = 1280.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 720.0;

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Document {
    pages: Vec<Page>,
    shapes: Vec<Shape>,
    assets: Vec<Asset>,
}

impl Document {
    fn has_page(&self, id: &PageId) -> bool {
        self.pages.iter().any(|p| &p.id == id)
    }

    /// Insert or replace a document record.
    fn upsert(&mut self, record: &Record) {
        match record {
            Record::Page(page) => match self.pages.iter_mut().find(|p| p.id == page.id) {
                Some(slot) => *slot = page.clone(),
                None => self.pages.push(page.clone()),
            },
            Record::Shape(shape) => match self.shapes.iter_mut().find(|s| s.id == shape.id) {
                Some(slot) => *slot = shape.clone(),
                None => self.shapes.push(shape.clone()),
            },
            Record::Asset(asset) => match self.assets.iter_mut().find(|a| a.id == asset.id) {
                Some(slot) => *slot = asset.clone(),
                None => self.assets.push(asset.clone()),
            },
            Record::Instance(_) | Record::PeerPage(_) | Record::Presence(_) => {}
        }
    }

    /// Remove a document record. Removing a page removes its shapes.
    fn erase(&mut self, record: &Record) {
        match record {
            Record::Page(page) => {
                self.shapes.retain(|s| s.page_id != page.id);
                self.pages.retain(|p| p.id != page.id);
            }
            Record::Shape(shape) => self.shapes.retain(|s| s.id != shape.id),
            Record::Asset(asset) => self.assets.retain(|a| a.id != asset.id),
            Record::Instance(_) | Record::PeerPage(_) | Record::Presence(_) => {}
        }
    }

    fn revert(&mut self, entry: &Changeset) {
        for record in &entry.added {
            self.erase(record);
        }
        // Pages before the shapes that sit on them.
        for record in entry.removed.iter().filter(|r| matches!(r, Record::Page(_))) {
            self.upsert(record);
        }
        for record in entry.removed.iter().filter(|r| !matches!(r, Record::Page(_))) {
            self.upsert(record);
        }
        for (before, _) in &entry.updated {
            self.upsert(before);
        }
    }

    fn replay(&mut self, entry: &Changeset) {
        for record in &entry.removed {
            self.erase(record);
        }
        for record in entry.added.iter().filter(|r| matches!(r, Record::Page(_))) {
            self.upsert(record);
        }
        for record in entry.added.iter().filter(|r| !matches!(r, Record::Page(_))) {
            self.upsert(record);
        }
        for (_, after) in &entry.updated {
            self.upsert(after);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Session {
    instance: InstanceState,
    peers: Vec<PeerPage>,
    presence: Vec<Presence>,
}

struct Inner {
    doc: Document,
    session: Session,
    undo: Vec<Changeset>,
    redo: Vec<Changeset>,
    fail_after: Option<usize>,
}

struct ListenerEntry {
    id: u64,
    filter: ChangeFilter,
    listener: Listener,
}

#[derive(Debug, Clone, Copy)]
enum HistoryStep {
    Undo,
    Redo,
}

// =============================================================================
// STORE
// =============================================================================

pub struct MemoryStore {
    inner: Mutex<Inner>,
    listeners: Arc<Mutex<Vec<ListenerEntry>>>,
    next_listener: AtomicU64,
    viewport: CanvasSize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store holding a single default page, rendered in a 1280×720 viewport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_viewport(CanvasSize::new(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT))
    }

    #[must_use]
    pub fn with_viewport(viewport: CanvasSize) -> Self {
        let page = Page::board(PageId::new(DEFAULT_PAGE_ID), DEFAULT_PAGE_NAME);
        let instance = InstanceState {
            current_page_id: page.id.clone(),
            camera: CameraState {
                camera: Camera::default(),
                options: CameraOptions::classroom(viewport).with_locked(false),
                last_fit: None,
            },
        };
        Self {
            inner: Mutex::new(Inner {
                doc: Document { pages: vec![page], shapes: Vec::new(), assets: Vec::new() },
                session: Session { instance, peers: Vec::new(), presence: Vec::new() },
                undo: Vec::new(),
                redo: Vec::new(),
                fail_after: None,
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(1),
            viewport,
        }
    }

    /// Make the next commit that reaches op number `ops` fail with
    /// [`StoreError::Rejected`] after applying `ops` operations. The fault
    /// fires once; shorter commits leave it armed.
    pub fn fail_after_ops(&self, ops: usize) {
        lock(&self.inner).fail_after = Some(ops);
    }

    /// Every shape in the document, across all pages.
    #[must_use]
    pub fn shapes(&self) -> Vec<Shape> {
        lock(&self.inner).doc.shapes.clone()
    }

    #[must_use]
    pub fn peers(&self) -> Vec<PeerPage> {
        lock(&self.inner).session.peers.clone()
    }

    #[must_use]
    pub fn presence(&self) -> Vec<Presence> {
        lock(&self.inner).session.presence.clone()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !lock(&self.inner).undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !lock(&self.inner).redo.is_empty()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn notify(&self, changeset: &Changeset) {
        let targets: Vec<(ChangeFilter, Listener)> = lock(&self.listeners)
            .iter()
            .map(|entry| (entry.filter, Arc::clone(&entry.listener)))
            .collect();
        for (filter, listener) in targets {
            if let Some(view) = filter.apply(changeset) {
                listener(&view);
            }
        }
    }

    fn step_history(&self, step: HistoryStep) -> bool {
        let changeset = {
            let mut inner = lock(&self.inner);
            let entry = match step {
                HistoryStep::Undo => inner.undo.pop(),
                HistoryStep::Redo => inner.redo.pop(),
            };
            let Some(entry) = entry else {
                return false;
            };

            let mut doc = inner.doc.clone();
            let mut session = inner.session.clone();
            match step {
                HistoryStep::Undo => doc.revert(&entry),
                HistoryStep::Redo => doc.replay(&entry),
            }
            if doc.pages.is_empty() {
                debug!(?step, "history step would leave no pages; skipped");
                match step {
                    HistoryStep::Undo => inner.undo.push(entry),
                    HistoryStep::Redo => inner.redo.push(entry),
                }
                return false;
            }
            if !doc.has_page(&session.instance.current_page_id) {
                if let Some(first) = doc.pages.first() {
                    session.instance.current_page_id = first.id.clone();
                }
            }

            let changeset = diff_states(Origin::Local, (&inner.doc, &inner.session), (&doc, &session));
            inner.doc = doc;
            inner.session = session;
            match step {
                HistoryStep::Undo => inner.redo.push(entry),
                HistoryStep::Redo => inner.undo.push(entry),
            }
            changeset
        };
        if !changeset.is_empty() {
            self.notify(&changeset);
        }
        true
    }
}

impl ReplicatedStore for MemoryStore {
    fn pages(&self) -> Vec<Page> {
        lock(&self.inner).doc.pages.clone()
    }

    fn page(&self, id: &PageId) -> Option<Page> {
        lock(&self.inner).doc.pages.iter().find(|p| &p.id == id).cloned()
    }

    fn current_page_id(&self) -> PageId {
        lock(&self.inner).session.instance.current_page_id.clone()
    }

    fn shapes_on_page(&self, id: &PageId) -> Vec<Shape> {
        lock(&self.inner)
            .doc
            .shapes
            .iter()
            .filter(|s| &s.page_id == id)
            .cloned()
            .collect()
    }

    fn assets(&self) -> Vec<Asset> {
        lock(&self.inner).doc.assets.clone()
    }

    fn camera(&self) -> CameraState {
        lock(&self.inner).session.instance.camera
    }

    fn commit(&self, tx: Transaction) -> Result<Changeset, StoreError> {
        let changeset = {
            let mut inner = lock(&self.inner);
            let mut doc = inner.doc.clone();
            let mut session = inner.session.clone();

            for (applied, op) in tx.ops().iter().enumerate() {
                if inner.fail_after == Some(applied) {
                    inner.fail_after = None;
                    debug!(applied, "injected store fault");
                    return Err(StoreError::Rejected(format!("injected fault after {applied} ops")));
                }
                apply_op(&mut doc, &mut session, op, self.viewport)?;
            }
            if !doc.has_page(&session.instance.current_page_id) {
                return Err(StoreError::DanglingCurrentPage(session.instance.current_page_id));
            }

            let changeset = diff_states(tx.origin(), (&inner.doc, &inner.session), (&doc, &session));
            if changeset.is_empty() {
                return Ok(changeset);
            }
            if tx.records_history() {
                let history = ChangeFilter::new(ChangeScope::Document, OriginFilter::All);
                if let Some(entry) = history.apply(&changeset) {
                    inner.undo.push(entry);
                    inner.redo.clear();
                }
            }
            inner.doc = doc;
            inner.session = session;
            changeset
        };
        self.notify(&changeset);
        Ok(changeset)
    }

    fn subscribe(&self, filter: ChangeFilter, listener: Listener) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push(ListenerEntry { id, filter, listener });
        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                lock(&listeners).retain(|entry| entry.id != id);
            }
        })
    }

    fn undo(&self) -> bool {
        self.step_history(HistoryStep::Undo)
    }

    fn redo(&self) -> bool {
        self.step_history(HistoryStep::Redo)
    }

    fn clear_history(&self) {
        let mut inner = lock(&self.inner);
        inner.undo.clear();
        inner.redo.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// OPS
// =============================================================================

fn apply_op(doc: &mut Document, session: &mut Session, op: &Op, viewport: CanvasSize) -> Result<(), StoreError> {
    match op {
        Op::CreatePage(page) => {
            if doc.has_page(&page.id) {
                return Err(StoreError::PageExists(page.id.clone()));
            }
            doc.pages.push(page.clone());
        }
        Op::RenamePage { id, name } => {
            let page = doc
                .pages
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| StoreError::PageNotFound(id.clone()))?;
            page.name.clone_from(name);
        }
        Op::DeletePage(id) => {
            if !doc.has_page(id) {
                return Err(StoreError::PageNotFound(id.clone()));
            }
            if let Some(locked) = doc.shapes.iter().find(|s| &s.page_id == id && s.locked) {
                return Err(StoreError::ShapeLocked(locked.id.clone()));
            }
            doc.shapes.retain(|s| &s.page_id != id);
            doc.pages.retain(|p| &p.id != id);
        }
        Op::SelectPage(id) => {
            if !doc.has_page(id) {
                return Err(StoreError::PageNotFound(id.clone()));
            }
            session.instance.current_page_id = id.clone();
        }
        Op::CreateAsset(asset) => {
            if doc.assets.iter().any(|a| a.id == asset.id) {
                return Err(StoreError::AssetExists(asset.id.clone()));
            }
            doc.assets.push(asset.clone());
        }
        Op::DeleteAsset(id) => {
            let before = doc.assets.len();
            doc.assets.retain(|a| &a.id != id);
            if doc.assets.len() == before {
                return Err(StoreError::AssetNotFound(id.clone()));
            }
        }
        Op::CreateShape(shape) => {
            if doc.shapes.iter().any(|s| s.id == shape.id) {
                return Err(StoreError::ShapeExists(shape.id.clone()));
            }
            if !doc.has_page(&shape.page_id) {
                return Err(StoreError::PageNotFound(shape.page_id.clone()));
            }
            doc.shapes.push(shape.clone());
        }
        Op::UpdateShape(shape) => {
            if !doc.has_page(&shape.page_id) {
                return Err(StoreError::PageNotFound(shape.page_id.clone()));
            }
            let slot = doc
                .shapes
                .iter_mut()
                .find(|s| s.id == shape.id)
                .ok_or_else(|| StoreError::ShapeNotFound(shape.id.clone()))?;
            *slot = shape.clone();
        }
        Op::DeleteShape(id) => {
            let shape = doc
                .shapes
                .iter()
                .find(|s| &s.id == id)
                .ok_or_else(|| StoreError::ShapeNotFound(id.clone()))?;
            if shape.locked {
                return Err(StoreError::ShapeLocked(id.clone()));
            }
            doc.shapes.retain(|s| &s.id != id);
        }
        Op::SetCameraOptions(options) => session.instance.camera.options = *options,
        Op::SetCameraLocked(locked) => session.instance.camera.options.locked = *locked,
        Op::FitToContent(request) => {
            let camera = &mut session.instance.camera;
            if camera.options.locked && !request.force {
                return Ok(());
            }
            let current = &session.instance.current_page_id;
            let content = doc
                .shapes
                .iter()
                .filter(|s| &s.page_id == current)
                .map(Shape::bounds)
                .reduce(Bounds::union)
                .unwrap_or(camera.options.bounds);
            camera.camera = Camera::fit(viewport, content);
            camera.last_fit = Some(*request);
        }
        Op::PutPeerPage(peer) => match session.peers.iter_mut().find(|p| p.peer_id == peer.peer_id) {
            Some(slot) => *slot = peer.clone(),
            None => session.peers.push(peer.clone()),
        },
        Op::PutPresence(presence) => match session.presence.iter_mut().find(|p| p.user_id == presence.user_id) {
            Some(slot) => *slot = presence.clone(),
            None => session.presence.push(presence.clone()),
        },
        Op::RemovePresence(user_id) => session.presence.retain(|p| &p.user_id != user_id),
    }
    Ok(())
}

// =============================================================================
// DIFF
// =============================================================================

fn diff_states(origin: Origin, before: (&Document, &Session), after: (&Document, &Session)) -> Changeset {
    let (old_doc, old_session) = before;
    let (new_doc, new_session) = after;
    let mut changeset = Changeset::empty(origin);

    diff_records(&old_doc.pages, &new_doc.pages, |p| p.id.clone(), Record::Page, &mut changeset);
    diff_records(&old_doc.assets, &new_doc.assets, |a| a.id.clone(), Record::Asset, &mut changeset);
    diff_records(&old_doc.shapes, &new_doc.shapes, |s| s.id.clone(), Record::Shape, &mut changeset);
    if old_session.instance != new_session.instance {
        changeset.updated.push((
            Record::Instance(old_session.instance.clone()),
            Record::Instance(new_session.instance.clone()),
        ));
    }
    diff_records(
        &old_session.peers,
        &new_session.peers,
        |p| p.peer_id.clone(),
        Record::PeerPage,
        &mut changeset,
    );
    diff_records(
        &old_session.presence,
        &new_session.presence,
        |p| p.user_id.clone(),
        Record::Presence,
        &mut changeset,
    );
    changeset
}

fn diff_records<T, K>(
    before: &[T],
    after: &[T],
    key: impl Fn(&T) -> K,
    wrap: impl Fn(T) -> Record,
    out: &mut Changeset,
) where
    T: Clone + PartialEq,
    K: PartialEq,
{
    for item in after {
        let id = key(item);
        match before.iter().find(|b| key(b) == id) {
            None => out.added.push(wrap(item.clone())),
            Some(previous) if previous != item => out.updated.push((wrap(previous.clone()), wrap(item.clone()))),
            Some(_) => {}
        }
    }
    for item in before {
        let id = key(item);
        if !after.iter().any(|a| key(a) == id) {
            out.removed.push(wrap(item.clone()));
        }
    }
}
