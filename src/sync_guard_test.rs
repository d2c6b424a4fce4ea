use super::*;

fn page(n: u16) -> PageId {
    PageId::activity(n)
}

#[test]
fn fresh_guard_allows_a_different_page() {
    let guard = SyncGuard::new();
    assert!(guard.should_sync(&page(2), &page(1)));
    assert!(!guard.in_flight());
    assert!(guard.last_synced().is_none());
}

#[test]
fn never_syncs_to_the_current_page() {
    let mut guard = SyncGuard::new();
    for n in 1..=5 {
        assert!(!guard.should_sync(&page(n), &page(n)));
    }
    guard.commit_sync(page(9));
    assert!(!guard.should_sync(&page(3), &page(3)));
}

#[test]
fn in_flight_blocks_every_candidate_until_settled() {
    let mut guard = SyncGuard::new();
    let token = guard.begin_sync(&page(2));
    assert!(guard.in_flight());
    for n in 2..=6 {
        assert!(!guard.should_sync(&page(n), &page(1)));
    }

    assert!(guard.settle(token));
    assert!(!guard.in_flight());
    assert!(guard.should_sync(&page(3), &page(1)));
}

#[test]
fn committed_page_is_not_reentered() {
    let mut guard = SyncGuard::new();
    let token = guard.begin_sync(&page(2));
    guard.commit_sync(page(2));
    guard.settle(token);

    assert_eq!(guard.last_synced(), Some(&page(2)));
    assert!(!guard.should_sync(&page(2), &page(1)));
    assert!(guard.should_sync(&page(3), &page(2)));
}

#[test]
fn stale_token_does_not_clear_newer_sync() {
    let mut guard = SyncGuard::new();
    let first = guard.begin_sync(&page(2));
    let second = guard.begin_sync(&page(3));
    assert_ne!(first, second);
    assert!(first < second);

    assert!(!guard.settle(first));
    assert!(guard.in_flight());
    assert!(guard.settle(second));
    assert!(!guard.in_flight());
}

#[test]
fn settling_twice_is_harmless() {
    let mut guard = SyncGuard::new();
    let token = guard.begin_sync(&page(2));
    assert!(guard.settle(token));
    assert!(!guard.settle(token));
}

#[test]
fn declined_navigation_settles_without_committing() {
    let mut guard = SyncGuard::new();
    let token = guard.begin_sync(&page(4));
    assert!(guard.settle(token));
    assert!(guard.last_synced().is_none());
    assert!(guard.should_sync(&page(4), &page(1)));
}
