use super::*;
use crate::ids::ShapeId;
use crate::store::memory::MemoryStore;

const CANVAS: CanvasSize = CanvasSize { width: 1920.0, height: 1080.0 };

fn images(n: usize) -> Vec<ImageRef> {
    let raw: Vec<String> = (1..=n).map(|i| format!("https://files.test/slides/{i}.png")).collect();
    parse_images(&raw).unwrap()
}

fn replica(name: &str) -> (ReplicaTarget, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let target: ReplicaTarget = (OccupantId::new(name), Arc::clone(&store) as Arc<dyn ReplicatedStore>);
    (target, store)
}

fn activity_ids(store: &MemoryStore) -> Vec<PageId> {
    store.pages().into_iter().filter(Page::is_activity).map(|p| p.id).collect()
}

fn doodle(page: &PageId, kind: ShapeKind, locked: bool) -> Shape {
    Shape {
        id: ShapeId::generate(),
        page_id: page.clone(),
        kind,
        x: 5.0,
        y: 5.0,
        w: 40.0,
        h: 40.0,
        locked,
        asset_id: None,
    }
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn empty_upload_is_rejected() {
    let raw: [&str; 0] = [];
    assert!(matches!(parse_images(&raw), Err(ActivityError::EmptyUpload)));

    let (target, store) = replica("ana");
    assert!(matches!(upload(&[target], &[], CANVAS), Err(ActivityError::EmptyUpload)));
    assert_eq!(store.pages().len(), 1);
}

#[test]
fn invalid_reference_is_rejected_before_mutation() {
    let err = parse_images(&["https://files.test/1.png", "not a url"]).unwrap_err();
    assert!(matches!(err, ActivityError::InvalidImage(_)));
    assert_eq!(err.error_code(), "E_INVALID_IMAGE");
}

#[test]
fn cohort_larger_than_two_digits_is_rejected() {
    let raw: Vec<String> = (0..=MAX_ACTIVITY_PAGES).map(|i| format!("https://files.test/{i}.png")).collect();
    assert!(matches!(
        parse_images(&raw),
        Err(ActivityError::TooManyImages { count: 100, max: 99 })
    ));
}

#[test]
fn cohort_pages_are_numbered_from_one() {
    let pages = cohort_pages(3);
    let ids: Vec<&str> = pages.iter().map(PageId::as_str).collect();
    assert_eq!(ids, ["page:IA-01", "page:IA-02", "page:IA-03"]);
}

// =============================================================================
// Upload
// =============================================================================

#[test]
fn upload_creates_one_locked_image_page_per_slide() {
    let (target, store) = replica("ana");
    let cohort = upload(&[target], &images(3), CANVAS).unwrap();

    assert_eq!(cohort.pages, cohort_pages(3));
    assert_eq!(activity_ids(&store), cohort_pages(3));
    for (index, page) in (1..=3_u16).zip(&cohort.pages) {
        let shapes = store.shapes_on_page(page);
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].kind, ShapeKind::Image);
        assert!(shapes[0].locked);
        assert_eq!((shapes[0].w, shapes[0].h), (1920.0, 1080.0));
        let asset = store
            .assets()
            .into_iter()
            .find(|a| Some(&a.id) == shapes[0].asset_id.as_ref())
            .unwrap();
        assert_eq!(asset.src, format!("https://files.test/slides/{index}.png"));
        assert_eq!(asset.name, format!("image-{index}"));
        assert_eq!(asset.mime_type, "image/png");
    }
    assert_eq!(store.assets().len(), 3);
}

#[test]
fn upload_selects_first_page_with_locked_fitted_camera() {
    let (target, store) = replica("ana");
    upload(&[target], &images(2), CANVAS).unwrap();

    assert_eq!(store.current_page_id(), PageId::activity(1));
    let camera = store.camera();
    assert!(camera.options.locked);
    assert_eq!(camera.last_fit, Some(FitRequest::IMMEDIATE));
}

#[test]
fn upload_reaches_every_replica() {
    let (a, store_a) = replica("ana");
    let (b, store_b) = replica("ben");
    upload(&[a, b], &images(2), CANVAS).unwrap();

    assert_eq!(activity_ids(&store_a), cohort_pages(2));
    assert_eq!(activity_ids(&store_b), cohort_pages(2));
}

#[test]
fn reupload_replaces_slides_and_keeps_annotations() {
    let (target, store) = replica("ana");
    upload(std::slice::from_ref(&target), &images(2), CANVAS).unwrap();
    let note = doodle(&PageId::activity(1), ShapeKind::Draw, false);
    store.commit(Transaction::local().with(Op::CreateShape(note.clone()))).unwrap();

    upload(&[target], &images(2), CANVAS).unwrap();

    assert_eq!(activity_ids(&store), cohort_pages(2));
    let on_first = store.shapes_on_page(&PageId::activity(1));
    assert_eq!(on_first.iter().filter(|s| s.kind == ShapeKind::Image).count(), 1);
    assert!(on_first.iter().any(|s| s.id == note.id));
    assert_eq!(store.assets().len(), 2);
}

#[test]
fn shorter_reupload_deletes_stale_pages() {
    let (target, store) = replica("ana");
    upload(std::slice::from_ref(&target), &images(4), CANVAS).unwrap();
    upload(&[target], &images(2), CANVAS).unwrap();

    assert_eq!(activity_ids(&store), cohort_pages(2));
    assert!(store.shapes_on_page(&PageId::activity(3)).is_empty());
    assert_eq!(store.assets().len(), 2);
}

#[test]
fn failed_batch_leaves_no_partial_cohort() {
    let (target, store) = replica("ana");
    store.fail_after_ops(4);

    let err = upload(&[target], &images(3), CANVAS).unwrap_err();

    assert!(matches!(&err, ActivityError::Store { occupant, .. } if occupant.as_str() == "ana"));
    assert!(err.retryable());
    assert_eq!(store.pages().len(), 1);
    assert!(store.assets().is_empty());
    assert!(store.shapes().is_empty());
}

#[test]
fn one_failing_replica_does_not_stop_the_others() {
    let (a, store_a) = replica("ana");
    let (b, store_b) = replica("ben");
    let (c, store_c) = replica("cy");
    store_b.fail_after_ops(1);

    let err = upload(&[a, b, c], &images(2), CANVAS).unwrap_err();

    assert!(matches!(&err, ActivityError::Store { occupant, .. } if occupant.as_str() == "ben"));
    assert_eq!(activity_ids(&store_a), cohort_pages(2));
    assert!(activity_ids(&store_b).is_empty());
    assert_eq!(activity_ids(&store_c), cohort_pages(2));
}

// =============================================================================
// Removal
// =============================================================================

#[test]
fn removal_deletes_pages_shapes_and_assets() {
    let (target, store) = replica("ana");
    upload(std::slice::from_ref(&target), &images(3), CANVAS).unwrap();
    let note = doodle(&PageId::activity(2), ShapeKind::Text, true);
    store.commit(Transaction::local().with(Op::CreateShape(note))).unwrap();

    let report = remove(&[target]).unwrap();

    assert_eq!(report, RemovalReport { replicas: 1, pages_removed: 3 });
    assert!(activity_ids(&store).is_empty());
    assert!(store.assets().is_empty());
    assert!(store.shapes().is_empty());
    assert!(store.pages().iter().any(|p| p.name == "Page 1"));
}

#[test]
fn removal_moves_off_the_deleted_page_and_refits() {
    let (target, store) = replica("ana");
    upload(std::slice::from_ref(&target), &images(2), CANVAS).unwrap();

    remove(&[target]).unwrap();

    assert_eq!(store.current_page_id(), store.pages()[0].id);
    assert_eq!(store.camera().last_fit, Some(FitRequest::FORCED));
}

#[test]
fn removal_cannot_be_undone() {
    let (target, store) = replica("ana");
    upload(std::slice::from_ref(&target), &images(2), CANVAS).unwrap();
    remove(&[target]).unwrap();

    assert!(!store.can_undo());
    assert!(!store.undo());
    assert!(activity_ids(&store).is_empty());
}

#[test]
fn removal_creates_whiteboard_when_nothing_else_remains() {
    let (target, store) = replica("ana");
    upload(std::slice::from_ref(&target), &images(1), CANVAS).unwrap();
    let default_page = store.pages()[0].id.clone();
    store.commit(Transaction::local().with(Op::DeletePage(default_page))).unwrap();
    assert_eq!(store.pages().len(), 1);

    remove(&[target]).unwrap();

    let pages = store.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id, PageId::whiteboard());
    assert_eq!(pages[0].name, WHITEBOARD_PAGE_NAME);
    assert_eq!(store.current_page_id(), PageId::whiteboard());
}

#[test]
fn removal_without_activity_only_clears_history() {
    let (target, store) = replica("ana");
    let note = doodle(&store.current_page_id(), ShapeKind::Draw, false);
    store.commit(Transaction::local().with(Op::CreateShape(note))).unwrap();
    assert!(store.can_undo());

    let report = remove(&[target]).unwrap();

    assert_eq!(report, RemovalReport { replicas: 1, pages_removed: 0 });
    assert!(!store.can_undo());
    assert_eq!(store.shapes().len(), 1);
}

#[test]
fn build_removal_is_none_without_activity_pages() {
    let store = MemoryStore::new();
    assert!(build_removal(&store).is_none());
}

#[test]
fn removal_recognises_untagged_marker_pages() {
    let (target, store) = replica("ana");
    let legacy = Page::board(PageId::new("page:IA-07"), "IA-07");
    store.commit(Transaction::remote().with(Op::CreatePage(legacy))).unwrap();

    let report = remove(&[target]).unwrap();

    assert_eq!(report.pages_removed, 1);
    assert!(store.page(&PageId::new("page:IA-07")).is_none());
}

// =============================================================================
// clear_page
// =============================================================================

#[test]
fn clear_page_keeps_frames_images_and_locked_shapes() {
    let (target, store) = replica("ana");
    upload(&[target], &images(1), CANVAS).unwrap();
    let page = PageId::activity(1);
    let drawn = doodle(&page, ShapeKind::Draw, false);
    let text = doodle(&page, ShapeKind::Text, false);
    let frame = doodle(&page, ShapeKind::Frame, false);
    let pinned = doodle(&page, ShapeKind::Geo, true);
    let mut tx = Transaction::local();
    for shape in [&drawn, &text, &frame, &pinned] {
        tx.push(Op::CreateShape(shape.clone()));
    }
    store.commit(tx).unwrap();

    let cleared = clear_page(store.as_ref()).unwrap();

    assert_eq!(cleared, 2);
    let left: Vec<ShapeId> = store.shapes_on_page(&page).into_iter().map(|s| s.id).collect();
    assert_eq!(left.len(), 3);
    assert!(left.contains(&frame.id));
    assert!(left.contains(&pinned.id));
    assert!(!left.contains(&drawn.id));
}

#[test]
fn clear_page_on_empty_page_is_a_noop() {
    let store = MemoryStore::new();
    assert_eq!(clear_page(&store).unwrap(), 0);
    assert!(!store.can_undo());
}
