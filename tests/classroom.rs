//! End-to-end classroom: one moderator process, two participant processes,
//! page changes relayed between them the way the transport would.

use std::sync::Arc;
use std::time::Duration;

use classboard::config::FollowConfig;
use classboard::coordinator::MultiReplicaCoordinator;
use classboard::ids::{OccupantId, PageId, Role, ViewContext, WHITEBOARD_PAGE_NAME};
use classboard::store::memory::MemoryStore;
use classboard::store::{
    ChangeFilter, ChangeScope, Changeset, Op, OriginFilter, PeerPage, Record, ReplicatedStore, Subscription,
    Transaction,
};

const AFTER_FRAME: Duration = Duration::from_millis(30);
const AFTER_SETTLE: Duration = Duration::from_millis(200);

const SLIDES: [&str; 3] = [
    "https://files.test/deck/1.png",
    "https://files.test/deck/2.png",
    "https://files.test/deck/3.png",
];

struct Participant {
    coordinator: MultiReplicaCoordinator,
    store: Arc<MemoryStore>,
}

impl Participant {
    async fn join(name: &str) -> Self {
        let coordinator =
            MultiReplicaCoordinator::new(name, Role::Participant, FollowConfig::default()).with_leader("Ana");
        let store = Arc::new(MemoryStore::new());
        coordinator
            .mount(name, ViewContext::Solo, Arc::clone(&store) as Arc<dyn ReplicatedStore>)
            .await
            .unwrap();
        Self { coordinator, store }
    }

    fn page(&self) -> PageId {
        self.store.current_page_id()
    }

    fn locked(&self) -> bool {
        self.store.camera().options.locked
    }
}

/// Forward the moderator's local page changes to every participant replica
/// as a remote peer-page update.
fn relay(moderator: &MemoryStore, leader: &str, participants: &[&Participant]) -> Subscription {
    let leader = OccupantId::new(leader);
    let targets: Vec<Arc<MemoryStore>> = participants.iter().map(|p| Arc::clone(&p.store)).collect();
    moderator.subscribe(
        ChangeFilter::new(ChangeScope::Session, OriginFilter::Local),
        Arc::new(move |changeset: &Changeset| {
            for (before, after) in &changeset.updated {
                let (Record::Instance(b), Record::Instance(a)) = (before, after) else {
                    continue;
                };
                if b.current_page_id == a.current_page_id {
                    continue;
                }
                for target in &targets {
                    target
                        .commit(Transaction::remote().with(Op::PutPeerPage(PeerPage {
                            peer_id: leader.clone(),
                            current_page_id: a.current_page_id.clone(),
                        })))
                        .unwrap();
                }
            }
        }),
    )
}

fn navigate(store: &MemoryStore, page: PageId) {
    store.commit(Transaction::local().with(Op::SelectPage(page))).unwrap();
}

#[tokio::test(start_paused = true)]
async fn lesson_follows_the_moderator_and_cleans_up() {
    let moderator = MultiReplicaCoordinator::new("Ana", Role::Moderator, FollowConfig::default());
    let own = Arc::new(MemoryStore::new());
    moderator
        .mount("Ana", ViewContext::Solo, Arc::clone(&own) as Arc<dyn ReplicatedStore>)
        .await
        .unwrap();
    let ben = Participant::join("Ben").await;
    let cy = Participant::join("Cy").await;
    let _relay = relay(&own, "Ana", &[&ben, &cy]);

    // Every process installs the cohort on the boards it controls.
    for p in [&ben, &cy] {
        p.coordinator.upload(&SLIDES, |_| {}).await.unwrap();
    }
    let cohort = moderator.upload(&SLIDES, |_| {}).await.unwrap();
    assert_eq!(cohort.pages.len(), 3);
    for p in [&ben, &cy] {
        assert_eq!(p.page(), PageId::activity(1));
        assert!(p.locked());
    }
    assert!(!own.camera().options.locked, "moderator browses activity pages freely");

    // Moderator moves; participants follow on the next frame.
    navigate(&own, PageId::activity(3));
    assert_eq!(ben.page(), PageId::activity(1));
    tokio::time::sleep(AFTER_FRAME).await;
    for p in [&ben, &cy] {
        assert_eq!(p.page(), PageId::activity(3));
        assert!(p.locked());
    }
    tokio::time::sleep(AFTER_SETTLE).await;

    // A second move inside the settle window is dropped.
    navigate(&own, PageId::activity(2));
    tokio::time::sleep(AFTER_FRAME).await;
    navigate(&own, PageId::activity(1));
    tokio::time::sleep(AFTER_SETTLE).await;
    for p in [&ben, &cy] {
        assert_eq!(p.page(), PageId::activity(2));
    }

    // Another participant's page does not drive the board.
    cy.store
        .commit(Transaction::remote().with(Op::PutPeerPage(PeerPage {
            peer_id: OccupantId::new("Cy"),
            current_page_id: PageId::activity(3),
        })))
        .unwrap();
    tokio::time::sleep(AFTER_SETTLE).await;
    assert_eq!(cy.page(), PageId::activity(2));

    // A participant wandering off does not bounce back to the synced page.
    navigate(&ben.store, PageId::activity(3));
    tokio::time::sleep(AFTER_SETTLE).await;
    assert_eq!(ben.page(), PageId::activity(3));

    // Teardown: participants first, then the moderator.
    for p in [&ben, &cy] {
        let report = p.coordinator.remove_activity().await.unwrap();
        assert_eq!(report.pages_removed, 3);
    }
    let report = moderator.remove_activity().await.unwrap();
    assert_eq!(report.pages_removed, 3);
    tokio::time::sleep(AFTER_SETTLE).await;

    for store in [&own, &ben.store, &cy.store] {
        assert!(store.pages().iter().all(|p| !p.is_activity()));
        assert!(store.assets().is_empty());
        assert!(!store.undo());
        let current = store.current_page_id();
        assert_eq!(store.page(&current).unwrap().name, WHITEBOARD_PAGE_NAME);
        assert!(!store.camera().options.locked);
    }
}

#[tokio::test(start_paused = true)]
async fn late_joiner_lands_on_the_first_slide() {
    let early = Participant::join("Ben").await;
    early.coordinator.upload(&SLIDES, |_| {}).await.unwrap();
    navigate(&early.store, PageId::activity(2));

    let coordinator = MultiReplicaCoordinator::new("Dee", Role::Participant, FollowConfig::default());
    let store = Arc::new(MemoryStore::new());
    let mut tx = Transaction::remote();
    for page in early.store.pages() {
        if page.is_activity() {
            tx.push(Op::CreatePage(page));
        }
    }
    store.commit(tx).unwrap();

    let handle = coordinator
        .mount("Dee", ViewContext::Solo, Arc::clone(&store) as Arc<dyn ReplicatedStore>)
        .await
        .unwrap();

    assert_eq!(store.current_page_id(), PageId::activity(1));
    assert!(store.camera().options.locked);
    assert_eq!(handle.follower().last_synced(), Some(PageId::activity(1)));
}
