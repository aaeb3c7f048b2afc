use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use careerlog_core::config::PresenterSettings;
use careerlog_core::events::PresenterEvent;
use careerlog_core::model::{
    Content, ContentDraft, ContentId, ContentUpdate, CoverLetter, CoverLetterDraft,
    CoverLetterUpdate, RecordEdit, RecordId, Tag, TagId,
};
use careerlog_core::mutation::RetryPolicy;
use careerlog_core::presenter::{EditKey, ListPresenter, PresenterError, Services};
use careerlog_core::selection::SelectionDirective;
use careerlog_core::service::{
    AuthSession, CoverLetterService, LocalSession, ServiceError, TagService,
};
use careerlog_core::store::DataStore;
use tokio::sync::mpsc::UnboundedReceiver;

/// In-memory store that counts writes and fails them on demand.
struct FlakyStore {
    inner: DataStore,
    fail_record_updates: AtomicBool,
    fail_deletes: AtomicBool,
    record_updates: AtomicUsize,
    content_updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl FlakyStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: DataStore::in_memory(),
            fail_record_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            record_updates: AtomicUsize::new(0),
            content_updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CoverLetterService for FlakyStore {
    async fn fetch_all_records(&self) -> Result<Vec<CoverLetter>, ServiceError> {
        self.inner.fetch_all_records().await
    }

    async fn fetch_contents_with_tags(
        &self,
        record_id: RecordId,
    ) -> Result<Vec<Content>, ServiceError> {
        self.inner.fetch_contents_with_tags(record_id).await
    }

    async fn insert_record(&self, draft: CoverLetterDraft) -> Result<CoverLetter, ServiceError> {
        self.inner.insert_record(draft).await
    }

    async fn update_record(&self, update: CoverLetterUpdate) -> Result<(), ServiceError> {
        self.record_updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_record_updates.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport("connection reset".to_string()));
        }
        self.inner.update_record(update).await
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), ServiceError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ServiceError::Server {
                status: 503,
                message: "maintenance".to_string(),
            });
        }
        self.inner.delete_record(id).await
    }

    async fn insert_content(&self, draft: ContentDraft) -> Result<Content, ServiceError> {
        self.inner.insert_content(draft).await
    }

    async fn update_content(&self, update: ContentUpdate) -> Result<(), ServiceError> {
        self.content_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_content(update).await
    }

    async fn delete_content(&self, id: ContentId, record_id: RecordId) -> Result<(), ServiceError> {
        self.inner.delete_content(id, record_id).await
    }
}

#[async_trait]
impl TagService for FlakyStore {
    async fn fetch_all_tags(&self) -> Result<Vec<Tag>, ServiceError> {
        self.inner.fetch_all_tags().await
    }

    async fn insert_tag(&self, name: &str) -> Result<Tag, ServiceError> {
        self.inner.insert_tag(name).await
    }

    async fn update_tag(&self, id: TagId, name: &str) -> Result<(), ServiceError> {
        self.inner.update_tag(id, name).await
    }

    async fn delete_tag(&self, id: TagId) -> Result<(), ServiceError> {
        self.inner.delete_tag(id).await
    }

    async fn attach_tag(&self, content_id: ContentId, tag_id: TagId) -> Result<(), ServiceError> {
        self.inner.attach_tag(content_id, tag_id).await
    }

    async fn detach_tag(&self, content_id: ContentId, tag_id: TagId) -> Result<(), ServiceError> {
        self.inner.detach_tag(content_id, tag_id).await
    }
}

fn settings() -> PresenterSettings {
    PresenterSettings {
        debounce_delay: Duration::from_millis(1000),
        retry: RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        background_filter_threshold: 512,
        seed_templates: false,
    }
}

fn presenter_over(
    store: &Arc<FlakyStore>,
    auth: Arc<LocalSession>,
    settings: PresenterSettings,
) -> (ListPresenter, UnboundedReceiver<PresenterEvent>) {
    let services = Services {
        letters: store.clone(),
        tags: store.clone(),
        auth,
    };
    ListPresenter::new(services, settings)
}

fn signed_in(store: &Arc<FlakyStore>) -> (ListPresenter, UnboundedReceiver<PresenterEvent>) {
    presenter_over(store, Arc::new(LocalSession::signed_in()), settings())
}

fn drain(rx: &mut UnboundedReceiver<PresenterEvent>) -> Vec<PresenterEvent> {
    let mut out = vec![];
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn last_visible(events: &[PresenterEvent]) -> (Vec<RecordId>, SelectionDirective) {
    events
        .iter()
        .rev()
        .find_map(|event| match event {
            PresenterEvent::VisibleSetChanged { items, selection } => {
                Some((items.iter().map(|r| r.id).collect(), selection.clone()))
            }
            _ => None,
        })
        .expect("a visible set was published")
}

fn visible_ids(presenter: &ListPresenter) -> Vec<RecordId> {
    presenter.visible().iter().map(|r| r.id).collect()
}

async fn seed_letter(store: &FlakyStore, company: &str, title: &str) -> CoverLetter {
    store
        .inner
        .insert_record(CoverLetterDraft::new(company, title, "Engineer"))
        .await
        .expect("insert record")
}

#[tokio::test(start_paused = true)]
async fn tag_filter_hides_and_restores_a_new_record() {
    let store = FlakyStore::new();
    seed_letter(&store, "Globex", "Analyst").await;
    seed_letter(&store, "Initech", "Support").await;

    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");
    assert_eq!(presenter.records().len(), 2);

    let id = presenter.insert_default().await.expect("insert");
    presenter
        .edit_record(
            id,
            RecordEdit {
                title: Some("Acme Corp".to_string()),
                ..RecordEdit::default()
            },
        )
        .await
        .expect("edit");
    let original = visible_ids(&presenter);
    assert_eq!(original[0], id);

    let content = presenter
        .add_content(id, "Why do you want to grow here?")
        .await
        .expect("add question");
    let growth = presenter.create_tag("growth").await.expect("create growth");
    presenter.create_tag("culture").await.expect("create culture");
    presenter
        .attach_tag(id, content.id, growth.id)
        .await
        .expect("attach");

    presenter.set_selected_tags(["growth"]).await.expect("filter");
    assert_eq!(visible_ids(&presenter), vec![id]);

    presenter.set_selected_tags(["culture"]).await.expect("filter");
    assert!(!visible_ids(&presenter).contains(&id));

    presenter
        .set_selected_tags(Vec::<String>::new())
        .await
        .expect("clear filter");
    assert_eq!(visible_ids(&presenter), original);
    let (published, _) = last_visible(&drain(&mut rx));
    assert_eq!(published, original);

    assert_eq!(presenter.flush_pending().await, 1);
    let stored = store.inner.fetch_all_records().await.expect("fetch");
    assert_eq!(stored[0].title, "Acme Corp");
    let joined = store
        .inner
        .fetch_contents_with_tags(id)
        .await
        .expect("fetch contents");
    assert_eq!(joined[0].tags[0].name, "growth");
}

#[tokio::test]
async fn failed_bookmark_toggle_rolls_back_once() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;

    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");
    drain(&mut rx);

    store.fail_record_updates.store(true, Ordering::SeqCst);
    let err = presenter.toggle_bookmark(letter.id).await.unwrap_err();
    assert!(matches!(err, PresenterError::Remote(ServiceError::Transport(_))));

    let events = drain(&mut rx);
    let rows: Vec<bool> = events
        .iter()
        .filter_map(|event| match event {
            PresenterEvent::RowChanged { row, .. } => Some(row.is_bookmarked),
            _ => None,
        })
        .collect();
    assert_eq!(rows, vec![true, false]);
    assert_eq!(
        rows.iter().filter(|bookmarked| !**bookmarked).count(),
        1,
        "exactly one reverted row notification"
    );
    assert!(
        events
            .iter()
            .any(|event| matches!(event, PresenterEvent::OperationFailed { .. }))
    );

    assert!(!presenter.record(letter.id).expect("record").is_bookmarked);
    assert_eq!(store.record_updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bookmark_under_bookmark_filter_republishes_without_moving_selection() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;

    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");
    presenter.toggle_bookmark_filter().await.expect("filter");
    let (ids, selection) = last_visible(&drain(&mut rx));
    assert!(ids.is_empty());
    assert_eq!(selection, SelectionDirective::Clear);

    assert!(presenter.toggle_bookmark(letter.id).await.expect("toggle"));
    let (ids, selection) = last_visible(&drain(&mut rx));
    assert_eq!(ids, vec![letter.id]);
    assert_eq!(selection, SelectionDirective::Unchanged);

    let stored = store.inner.fetch_all_records().await.expect("fetch");
    assert!(stored[0].is_bookmarked);
}

#[tokio::test]
async fn delete_waits_for_the_remote_and_is_idempotent() {
    let store = FlakyStore::new();
    let keep = seed_letter(&store, "Globex", "Analyst").await;
    let doomed = seed_letter(&store, "Acme Corp", "Platform").await;

    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");

    store.fail_deletes.store(true, Ordering::SeqCst);
    assert!(presenter.delete(doomed.id).await.is_err());
    assert!(presenter.record(doomed.id).is_some(), "delete is not optimistic");

    store.fail_deletes.store(false, Ordering::SeqCst);
    presenter.delete(doomed.id).await.expect("delete");
    assert!(presenter.record(doomed.id).is_none());
    let (ids, selection) = last_visible(&drain(&mut rx));
    assert_eq!(ids, vec![keep.id]);
    assert_eq!(
        selection,
        SelectionDirective::Select {
            id: keep.id,
            scroll: true
        }
    );

    let calls = store.deletes.load(Ordering::SeqCst);
    presenter.delete(doomed.id).await.expect("second delete");
    assert_eq!(store.deletes.load(Ordering::SeqCst), calls);

    // Gone remotely but still listed locally.
    store.inner.delete_record(keep.id).await.expect("remote delete");
    presenter.delete(keep.id).await.expect("stale delete");
    assert!(presenter.records().is_empty());
}

#[tokio::test]
async fn user_filter_changes_never_fall_back_but_system_changes_do() {
    let store = FlakyStore::new();
    let a = seed_letter(&store, "Acme Corp", "A").await;
    let b = seed_letter(&store, "Bolt", "B").await;
    let c = seed_letter(&store, "Cyberdyne", "C").await;

    let x = store.inner.insert_tag("x").await.expect("tag");
    let y = store.inner.insert_tag("y").await.expect("tag");
    for (letter, tags) in [(&a, vec![x.id]), (&b, vec![x.id, y.id]), (&c, vec![y.id])] {
        let content = store
            .inner
            .insert_content(ContentDraft::new(letter.id, "Why?", &["Because"]))
            .await
            .expect("content");
        for tag in tags {
            store.inner.attach_tag(content.id, tag).await.expect("attach");
        }
    }

    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");

    presenter.set_selected_tags(["x"]).await.expect("filter x");
    let mut shown = visible_ids(&presenter);
    shown.sort();
    assert_eq!(shown, vec![a.id, b.id]);

    presenter.select(a.id).await.expect("select");
    assert_eq!(presenter.selected_id(), Some(a.id));

    presenter.set_selected_tags(["y"]).await.expect("filter y");
    let (_, selection) = last_visible(&drain(&mut rx));
    assert_eq!(selection, SelectionDirective::Clear);
    assert_eq!(presenter.selected_id(), None);

    // Search never moves the selection.
    presenter.select(b.id).await.expect("select");
    presenter.set_search_text("cyber").await.expect("search");
    let (ids, selection) = last_visible(&drain(&mut rx));
    assert_eq!(ids, vec![c.id]);
    assert_eq!(selection, SelectionDirective::Unchanged);
    presenter.set_search_text("").await.expect("clear search");

    // Deleting the selection settles on the first visible record.
    presenter.delete(b.id).await.expect("delete");
    let (ids, selection) = last_visible(&drain(&mut rx));
    assert_eq!(ids, vec![c.id]);
    assert_eq!(
        selection,
        SelectionDirective::Select {
            id: c.id,
            scroll: true
        }
    );
}

#[tokio::test]
async fn empty_store_is_seeded_once_with_guides() {
    let store = FlakyStore::new();
    let seeded = PresenterSettings {
        seed_templates: true,
        ..settings()
    };
    let (mut presenter, _rx) =
        presenter_over(&store, Arc::new(LocalSession::signed_in()), seeded.clone());
    presenter.load().await.expect("load");

    let records = presenter.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.title.starts_with("CareerLog guide")));
    let mut sizes: Vec<usize> = records.iter().map(|r| r.contents.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![3, 5]);

    let writing = records
        .iter()
        .find(|r| r.contents.len() == 5)
        .expect("writing guide");
    assert_eq!(writing.contents[0].question, "Can I only write one answer?");

    let (mut again, _rx) =
        presenter_over(&store, Arc::new(LocalSession::signed_in()), seeded);
    again.load().await.expect("reload");
    assert_eq!(again.records().len(), 2);
}

#[tokio::test]
async fn signed_out_shows_sample_and_rejects_writes() {
    let store = FlakyStore::new();
    seed_letter(&store, "Acme Corp", "Platform").await;
    let auth = Arc::new(LocalSession::signed_out());

    let (mut presenter, mut rx) = presenter_over(&store, auth.clone(), settings());
    presenter.load().await.expect("load");
    let events = drain(&mut rx);
    assert_eq!(events[0], PresenterEvent::AuthStateChanged { logged_in: false });
    assert_eq!(visible_ids(&presenter), vec![-1]);
    assert!(presenter.tags(false).await.expect("tags").is_empty());

    let err = presenter.toggle_bookmark(-1).await.unwrap_err();
    assert!(matches!(err, PresenterError::NotLoggedIn { .. }));
    assert!(
        drain(&mut rx)
            .iter()
            .any(|event| matches!(event, PresenterEvent::OperationFailed { .. }))
    );
    assert!(matches!(
        presenter.insert_default().await,
        Err(PresenterError::NotLoggedIn { .. })
    ));
    assert_eq!(store.inner.letter_count(), 1);

    auth.sign_in();
    presenter.auth_changed().await.expect("reload");
    assert_eq!(
        drain(&mut rx)[0],
        PresenterEvent::AuthStateChanged { logged_in: true }
    );
    assert_eq!(presenter.records().len(), 1);
    assert_eq!(presenter.records()[0].company_name(), "Acme Corp");
}

#[tokio::test(start_paused = true)]
async fn rapid_answer_edits_are_written_once() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, _rx) = signed_in(&store);
    presenter.load().await.expect("load");
    let content = presenter
        .add_content(letter.id, "Why Acme?")
        .await
        .expect("add");

    for n in 1..=5 {
        let mut edited = content.clone();
        edited.answers = vec![format!("draft {n}")];
        presenter
            .update_content(letter.id, edited)
            .await
            .expect("update");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(presenter.is_pending(EditKey::Content(content.id)));
    assert_eq!(store.content_updates.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    tokio::task::yield_now().await;

    assert_eq!(store.content_updates.load(Ordering::SeqCst), 1);
    assert_eq!(presenter.pending_writes(), 0);
    let stored = store
        .inner
        .fetch_contents_with_tags(letter.id)
        .await
        .expect("contents");
    assert_eq!(stored[0].answers, vec!["draft 5".to_string()]);
    assert_eq!(
        presenter.record(letter.id).expect("record").contents[0].answers,
        vec!["draft 5".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn deleting_a_question_drops_its_pending_edit() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, _rx) = signed_in(&store);
    presenter.load().await.expect("load");
    let content = presenter
        .add_content(letter.id, "Why Acme?")
        .await
        .expect("add");

    let mut edited = content.clone();
    edited.answers = vec!["never written".to_string()];
    presenter
        .update_content(letter.id, edited)
        .await
        .expect("update");
    assert!(presenter.is_pending(EditKey::Content(content.id)));

    presenter
        .delete_content(letter.id, content.id)
        .await
        .expect("delete");
    assert!(!presenter.is_pending(EditKey::Content(content.id)));
    assert!(presenter.record(letter.id).expect("record").contents.is_empty());

    presenter
        .delete_content(letter.id, content.id)
        .await
        .expect("second delete is a no-op");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    tokio::task::yield_now().await;
    assert_eq!(store.content_updates.load(Ordering::SeqCst), 0);
    let stored = store
        .inner
        .fetch_contents_with_tags(letter.id)
        .await
        .expect("contents");
    assert!(stored.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_debounced_write_retries_then_keeps_the_edit() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");
    drain(&mut rx);

    store.fail_record_updates.store(true, Ordering::SeqCst);
    presenter
        .edit_record(
            letter.id,
            RecordEdit {
                memo: Some(Some("call recruiter".to_string())),
                ..RecordEdit::default()
            },
        )
        .await
        .expect("edit");

    tokio::time::sleep(Duration::from_secs(3)).await;
    tokio::task::yield_now().await;

    assert_eq!(store.record_updates.load(Ordering::SeqCst), 3);
    assert!(drain(&mut rx).iter().any(|event| matches!(
        event,
        PresenterEvent::OperationFailed { message } if message.contains("could not be saved")
    )));
    assert_eq!(
        presenter.record(letter.id).expect("record").memo.as_deref(),
        Some("call recruiter")
    );
}

#[tokio::test(start_paused = true)]
async fn bookmark_toggled_during_a_pending_edit_survives_the_save() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, _rx) = signed_in(&store);
    presenter.load().await.expect("load");

    presenter
        .edit_record(
            letter.id,
            RecordEdit {
                memo: Some(Some("call recruiter".to_string())),
                ..RecordEdit::default()
            },
        )
        .await
        .expect("edit");
    assert!(presenter.toggle_bookmark(letter.id).await.expect("bookmark"));
    assert!(presenter.is_pending(EditKey::Record(letter.id)));

    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;

    let remote = store.inner.fetch_all_records().await.expect("fetch");
    assert!(remote[0].is_bookmarked);
    assert_eq!(remote[0].memo.as_deref(), Some("call recruiter"));
    assert!(presenter.record(letter.id).expect("record").is_bookmarked);
}

#[tokio::test(start_paused = true)]
async fn flush_waits_for_a_save_between_retries() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let slow_retry = PresenterSettings {
        retry: RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_secs(5),
        },
        ..settings()
    };
    let (mut presenter, _rx) =
        presenter_over(&store, Arc::new(LocalSession::signed_in()), slow_retry);
    presenter.load().await.expect("load");

    store.fail_record_updates.store(true, Ordering::SeqCst);
    presenter
        .edit_record(
            letter.id,
            RecordEdit {
                memo: Some(Some("call recruiter".to_string())),
                ..RecordEdit::default()
            },
        )
        .await
        .expect("edit");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.record_updates.load(Ordering::SeqCst), 1);
    assert!(!presenter.is_pending(EditKey::Record(letter.id)));

    store.fail_record_updates.store(false, Ordering::SeqCst);
    assert_eq!(presenter.flush_pending().await, 1);
    assert_eq!(store.record_updates.load(Ordering::SeqCst), 2);

    let remote = store.inner.fetch_all_records().await.expect("fetch");
    assert_eq!(remote[0].memo.as_deref(), Some("call recruiter"));
}

#[tokio::test(start_paused = true)]
async fn update_record_stores_blank_text_as_none() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, _rx) = signed_in(&store);
    presenter.load().await.expect("load");

    let mut edited = presenter.record(letter.id).expect("record").clone();
    edited.company = Some("   ".to_string());
    edited.memo = Some(" follow up ".to_string());
    presenter.update_record(edited).await.expect("update");

    let local = presenter.record(letter.id).expect("record");
    assert_eq!(local.company, None);
    assert_eq!(local.memo.as_deref(), Some("follow up"));

    assert_eq!(presenter.flush_pending().await, 1);
    let remote = store.inner.fetch_all_records().await.expect("fetch");
    assert_eq!(remote[0].company, None);
    assert_eq!(remote[0].memo.as_deref(), Some("follow up"));
}

#[tokio::test(start_paused = true)]
async fn delete_cancels_pending_edits() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, _rx) = signed_in(&store);
    presenter.load().await.expect("load");

    presenter
        .edit_record(
            letter.id,
            RecordEdit {
                title: Some("Renamed".to_string()),
                ..RecordEdit::default()
            },
        )
        .await
        .expect("edit");
    assert_eq!(presenter.pending_writes(), 1);

    presenter.delete(letter.id).await.expect("delete");
    assert_eq!(presenter.pending_writes(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.record_updates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn sign_out_flushes_pending_edits() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, mut rx) = signed_in(&store);
    presenter.load().await.expect("load");

    presenter
        .edit_record(
            letter.id,
            RecordEdit {
                company: Some(None),
                ..RecordEdit::default()
            },
        )
        .await
        .expect("edit");
    drain(&mut rx);

    presenter.sign_out().await.expect("sign out");
    assert_eq!(store.record_updates.load(Ordering::SeqCst), 1);
    let stored = store.inner.fetch_all_records().await.expect("fetch");
    assert_eq!(stored[0].company, None);

    let events = drain(&mut rx);
    assert_eq!(events[0], PresenterEvent::AuthStateChanged { logged_in: false });
    assert_eq!(visible_ids(&presenter), vec![-1]);
}

#[tokio::test]
async fn operations_before_load_are_programming_errors() {
    let store = FlakyStore::new();
    let (mut presenter, mut rx) = signed_in(&store);

    assert!(matches!(
        presenter.toggle_bookmark_filter().await,
        Err(PresenterError::NotLoaded)
    ));
    assert!(matches!(
        presenter.delete(1).await,
        Err(PresenterError::NotLoaded)
    ));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn tag_rename_and_delete_follow_references_and_filter() {
    let store = FlakyStore::new();
    let letter = seed_letter(&store, "Acme Corp", "Platform").await;
    let (mut presenter, _rx) = signed_in(&store);
    presenter.load().await.expect("load");

    let content = presenter
        .add_content(letter.id, "Where do you see yourself?")
        .await
        .expect("add");
    let growth = presenter.create_tag("growth").await.expect("create");
    presenter
        .attach_tag(letter.id, content.id, growth.id)
        .await
        .expect("attach");

    assert!(matches!(
        presenter.create_tag(" GROWTH ").await,
        Err(PresenterError::DuplicateTag(_))
    ));
    assert!(matches!(
        presenter.create_tag("   ").await,
        Err(PresenterError::InvalidTagName)
    ));

    presenter.set_selected_tags(["growth"]).await.expect("filter");
    presenter
        .rename_tag(growth.id, "Growth mindset")
        .await
        .expect("rename");
    assert!(presenter.filter().tags.contains("Growth mindset"));
    assert_eq!(
        presenter.record(letter.id).expect("record").tag_names(),
        vec!["Growth mindset"]
    );
    assert_eq!(visible_ids(&presenter), vec![letter.id]);

    presenter.delete_tag(growth.id).await.expect("delete tag");
    assert!(presenter.filter().tags.is_empty());
    assert!(
        presenter.record(letter.id).expect("record").contents[0]
            .tags
            .is_empty()
    );
    assert_eq!(visible_ids(&presenter), vec![letter.id]);
    assert!(presenter.tags(false).await.expect("tags").is_empty());
    assert_eq!(store.inner.tag_link_count(), 0);
}
