// tests/comment_flow_tests.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use labs_client::{
    api::LabsApi,
    comments::CommentManager,
    error::AppError,
    models::{
        comment::{Comment, CommentDto, CommentId, CommentPage},
        question::{AnswerResult, QuestionDto, SubmitAnswerRequest},
        user::SessionUser,
    },
    notice::{NoticeEvent, NoticeKind, Notices},
};
use tokio::sync::Notify;

/// In-memory comment store per lab, with switches to hold or fail requests.
struct FakeLabs {
    comments: Mutex<HashMap<i64, Vec<CommentDto>>>,
    next_id: AtomicI64,
    hold_creates: AtomicBool,
    release: Notify,
    fail_creates: AtomicBool,
    /// Stores the comment but answers with a timestamp nobody can parse.
    garble_created: AtomicBool,
    fail_updates: AtomicBool,
    list_calls: AtomicUsize,
    update_calls: AtomicUsize,
    deleted: Mutex<Vec<i64>>,
}

impl FakeLabs {
    fn with(lab_id: i64, seed: Vec<CommentDto>) -> Arc<Self> {
        Arc::new(Self {
            comments: Mutex::new(HashMap::from([(lab_id, seed)])),
            next_id: AtomicI64::new(42),
            hold_creates: AtomicBool::new(false),
            release: Notify::new(),
            fail_creates: AtomicBool::new(false),
            garble_created: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        })
    }

    fn stored(&self, lab_id: i64) -> usize {
        self.comments
            .lock()
            .unwrap()
            .get(&lab_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl LabsApi for FakeLabs {
    async fn list_questions(&self, _lab_id: i64) -> Result<Vec<QuestionDto>, AppError> {
        Ok(Vec::new())
    }

    async fn submit_answer(
        &self,
        _lab_id: i64,
        _question_id: i64,
        _request: &SubmitAnswerRequest,
    ) -> Result<AnswerResult, AppError> {
        Err(AppError::NotFound("No questions here".to_string()))
    }

    async fn list_comments(
        &self,
        lab_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let store = self.comments.lock().unwrap();
        let all = store.get(&lab_id).cloned().unwrap_or_default();
        let start = ((page.max(1) - 1) * page_size) as usize;
        Ok(CommentPage {
            total: all.len() as u64,
            items: all.into_iter().skip(start).take(page_size as usize).collect(),
        })
    }

    async fn create_comment(
        &self,
        lab_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<CommentDto, AppError> {
        if self.hold_creates.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError("database is down".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = dto(id, parent_id, 7, content);
        self.comments
            .lock()
            .unwrap()
            .entry(lab_id)
            .or_default()
            .push(created.clone());
        if self.garble_created.load(Ordering::SeqCst) {
            return Ok(CommentDto {
                created_at: "not a time".to_string(),
                ..created
            });
        }
        Ok(created)
    }

    async fn update_comment(&self, comment_id: i64, content: &str) -> Result<(), AppError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Network("timed out".to_string()));
        }
        for list in self.comments.lock().unwrap().values_mut() {
            if let Some(c) = list.iter_mut().find(|c| c.id == comment_id) {
                c.content = content.to_string();
            }
        }
        Ok(())
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<(), AppError> {
        self.deleted.lock().unwrap().push(comment_id);
        for list in self.comments.lock().unwrap().values_mut() {
            list.retain(|c| c.id != comment_id);
        }
        Ok(())
    }
}

fn dto(id: i64, parent_id: Option<i64>, user_id: i64, content: &str) -> CommentDto {
    CommentDto {
        id,
        parent_id,
        user_id,
        content: content.to_string(),
        created_at: "2025-03-01 08:00:00".to_string(),
        username: format!("user{}", user_id),
        avatar_url: None,
        role: Some("learner".to_string()),
        deleted_at: None,
    }
}

fn learner(id: i64) -> SessionUser {
    SessionUser {
        id,
        username: format!("user{}", id),
        avatar_url: None,
        role: "learner".to_string(),
    }
}

fn manager(fake: &Arc<FakeLabs>, page_size: u32, notices: &Notices) -> CommentManager {
    let manager = CommentManager::new(fake.clone(), Some(1), page_size, notices.clone());
    manager.set_user(Some(learner(7)));
    manager
}

/// Lets spawned work run until an optimistic comment shows up.
async fn wait_for_pending(manager: &CommentManager) -> Comment {
    for _ in 0..100 {
        if let Some(pending) = manager.snapshot().tree.pending().into_iter().next() {
            return pending;
        }
        tokio::task::yield_now().await;
    }
    panic!("no pending comment appeared");
}

fn error_notices(rx: &mut tokio::sync::broadcast::Receiver<NoticeEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = rx.try_recv() {
        if let NoticeEvent::Shown(n) = event {
            if n.kind == NoticeKind::Error {
                count += 1;
            }
        }
    }
    count
}

#[tokio::test]
async fn optimistic_comment_is_replaced_by_server_copy() {
    // Arrange
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "first")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    fake.hold_creates.store(true, Ordering::SeqCst);

    // Act
    let posting = {
        let thread = thread.clone();
        tokio::spawn(async move { thread.create_comment("hello", None).await })
    };
    let pending = wait_for_pending(&thread).await;

    // Assert: visible right away, marked as sending
    assert!(pending.id.is_pending());
    assert!(pending.is_sending);
    assert_eq!(pending.user_id, 7);
    let snapshot = thread.snapshot();
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.tree.roots().first(), Some(&pending.id));

    fake.release.notify_one();
    let id = posting.await.unwrap().unwrap();

    // Assert: exactly one confirmed copy, no leftovers
    assert_eq!(id, CommentId::Confirmed(42));
    let snapshot = thread.snapshot();
    assert!(snapshot.tree.pending().is_empty());
    assert_eq!(snapshot.tree.len(), 2);
    assert_eq!(
        snapshot.tree.flatten().iter().filter(|c| c.id == id).count(),
        1
    );
    assert_eq!(snapshot.total, 2);
}

#[tokio::test]
async fn failed_reply_deep_in_thread_is_rolled_back() {
    let fake = FakeLabs::with(
        1,
        vec![
            dto(1, None, 8, "root"),
            dto(2, Some(1), 9, "child"),
            dto(3, Some(2), 8, "grandchild"),
        ],
    );
    let notices = Notices::default();
    let mut notice_rx = notices.subscribe();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    fake.fail_creates.store(true, Ordering::SeqCst);

    let err = thread.create_comment("deep reply", Some(3)).await.unwrap_err();

    assert!(matches!(err, AppError::InternalServerError(_)));
    let snapshot = thread.snapshot();
    assert_eq!(snapshot.tree.len(), 3);
    assert_eq!(snapshot.total, 3);
    assert!(snapshot.tree.pending().is_empty());
    assert!(snapshot.tree.children(CommentId::Confirmed(3)).is_empty());
    assert_eq!(error_notices(&mut notice_rx), 1);
}

#[tokio::test]
async fn reply_to_unknown_parent_is_rejected_locally() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "root")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();

    let err = thread.create_comment("hi", Some(77)).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(fake.stored(1), 1);
    assert_eq!(thread.snapshot().total, 1);
}

#[tokio::test]
async fn posting_needs_a_user_and_content() {
    let fake = FakeLabs::with(1, vec![]);
    let notices = Notices::default();
    let thread = CommentManager::new(fake.clone(), Some(1), 10, notices);

    let err = thread.create_comment("hello", None).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));

    thread.set_user(Some(learner(7)));
    let err = thread.create_comment("   ", None).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(fake.stored(1), 0);
}

#[tokio::test]
async fn load_more_keeps_replies_attached() {
    let fake = FakeLabs::with(
        1,
        vec![
            dto(1, None, 8, "a"),
            dto(2, None, 8, "b"),
            dto(3, Some(1), 9, "reply to a"),
            dto(4, Some(2), 9, "reply to b"),
        ],
    );
    let notices = Notices::default();
    let thread = manager(&fake, 2, &notices);

    thread.load_page(1).await.unwrap();
    assert!(thread.has_more());

    thread.load_more().await.unwrap();

    let snapshot = thread.snapshot();
    assert_eq!(snapshot.page, 2);
    assert!(!snapshot.has_more);
    assert_eq!(snapshot.tree.len(), 4);
    assert_eq!(snapshot.tree.roots().len(), 2);
    assert_eq!(
        snapshot.tree.children(CommentId::Confirmed(1)),
        &[CommentId::Confirmed(3)]
    );
    assert_eq!(
        snapshot.tree.children(CommentId::Confirmed(2)),
        &[CommentId::Confirmed(4)]
    );
}

#[tokio::test]
async fn edit_is_owner_only_and_failed_edit_keeps_old_text() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 7, "mine"), dto(2, None, 8, "theirs")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();

    let err = thread
        .update_comment(CommentId::Confirmed(2), "hijack")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));
    assert_eq!(fake.update_calls.load(Ordering::SeqCst), 0);

    thread
        .update_comment(CommentId::Confirmed(1), "edited")
        .await
        .unwrap();
    let content = |thread: &CommentManager| {
        thread
            .snapshot()
            .tree
            .get(CommentId::Confirmed(1))
            .map(|c| c.content.clone())
    };
    assert_eq!(content(&thread).as_deref(), Some("edited"));

    fake.fail_updates.store(true, Ordering::SeqCst);
    let err = thread
        .update_comment(CommentId::Confirmed(1), "lost edit")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Network(_)));
    assert_eq!(content(&thread).as_deref(), Some("edited"));

    let err = thread
        .update_comment(CommentId::Confirmed(1), "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn pending_comment_cannot_be_edited() {
    let fake = FakeLabs::with(1, vec![]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    fake.hold_creates.store(true, Ordering::SeqCst);

    let posting = {
        let thread = thread.clone();
        tokio::spawn(async move { thread.create_comment("draft", None).await })
    };
    let pending = wait_for_pending(&thread).await;

    assert!(!thread.can_edit(&pending));
    let err = thread.update_comment(pending.id, "changed").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    fake.release.notify_one();
    posting.await.unwrap().unwrap();
}

#[tokio::test]
async fn deleting_a_pending_comment_stays_local() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "root")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    fake.hold_creates.store(true, Ordering::SeqCst);

    let posting = {
        let thread = thread.clone();
        tokio::spawn(async move { thread.create_comment("oops", None).await })
    };
    let pending = wait_for_pending(&thread).await;

    thread.delete_comment(pending.id).await.unwrap();

    let snapshot = thread.snapshot();
    assert!(snapshot.tree.pending().is_empty());
    assert_eq!(snapshot.total, 1);
    assert!(fake.deleted.lock().unwrap().is_empty());

    fake.release.notify_one();
    posting.await.unwrap().unwrap();
    assert!(thread.snapshot().tree.pending().is_empty());
}

#[tokio::test]
async fn deleting_a_confirmed_comment_reloads_the_thread() {
    let fake = FakeLabs::with(
        1,
        vec![dto(1, None, 8, "root"), dto(2, Some(1), 7, "my reply")],
    );
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    let lists_before = fake.list_calls.load(Ordering::SeqCst);

    let err = thread
        .delete_comment(CommentId::Confirmed(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));

    thread.delete_comment(CommentId::Confirmed(2)).await.unwrap();

    assert_eq!(*fake.deleted.lock().unwrap(), vec![2]);
    assert_eq!(fake.list_calls.load(Ordering::SeqCst), lists_before + 1);
    let snapshot = thread.snapshot();
    assert!(!snapshot.tree.contains(CommentId::Confirmed(2)));
    assert_eq!(snapshot.total, 1);
}

#[tokio::test]
async fn admin_may_delete_any_comment() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "spam")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.set_user(Some(SessionUser {
        role: "admin".to_string(),
        ..learner(99)
    }));
    thread.load_page(1).await.unwrap();

    let spam = thread
        .snapshot()
        .tree
        .get(CommentId::Confirmed(1))
        .cloned()
        .unwrap();
    assert!(thread.can_delete(&spam));
    assert!(!thread.can_edit(&spam));

    thread.delete_comment(CommentId::Confirmed(1)).await.unwrap();
    assert!(thread.snapshot().tree.is_empty());
}

#[tokio::test]
async fn completion_for_a_previous_lab_is_ignored() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "lab one")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    fake.hold_creates.store(true, Ordering::SeqCst);

    let posting = {
        let thread = thread.clone();
        tokio::spawn(async move { thread.create_comment("late", None).await })
    };
    wait_for_pending(&thread).await;

    thread.set_lab(Some(2));
    assert!(thread.snapshot().tree.is_empty());

    fake.release.notify_one();
    posting.await.unwrap().unwrap();

    let snapshot = thread.snapshot();
    assert!(snapshot.tree.is_empty());
    assert_eq!(snapshot.total, 0);
}

#[tokio::test]
async fn nothing_loads_after_shutdown() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "root")]);
    let notices = Notices::default();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();

    thread.shutdown();
    thread.load_page(1).await.unwrap();

    assert_eq!(fake.list_calls.load(Ordering::SeqCst), 1);
    assert!(thread.snapshot().tree.is_empty());
}

#[tokio::test]
async fn reply_in_flight_survives_load_more_and_reload() {
    let fake = FakeLabs::with(
        1,
        vec![
            dto(1, None, 8, "a"),
            dto(2, None, 8, "b"),
            dto(3, Some(1), 9, "reply to a"),
        ],
    );
    let notices = Notices::default();
    let thread = manager(&fake, 2, &notices);
    thread.load_page(1).await.unwrap();
    fake.hold_creates.store(true, Ordering::SeqCst);

    let posting = {
        let thread = thread.clone();
        tokio::spawn(async move { thread.create_comment("me too", Some(1)).await })
    };
    let pending = wait_for_pending(&thread).await;

    thread.load_more().await.unwrap();
    let snapshot = thread.snapshot();
    assert!(snapshot.tree.children(CommentId::Confirmed(1)).contains(&pending.id));
    assert!(snapshot.tree.children(CommentId::Confirmed(1)).contains(&CommentId::Confirmed(3)));
    // Three on the server plus the one still sending.
    assert_eq!(snapshot.total, 4);

    thread.load_page(1).await.unwrap();
    let snapshot = thread.snapshot();
    assert!(snapshot.tree.contains(pending.id));
    assert_eq!(snapshot.total, 4);

    fake.release.notify_one();
    let id = posting.await.unwrap().unwrap();

    let snapshot = thread.snapshot();
    assert!(snapshot.tree.pending().is_empty());
    assert!(!snapshot.tree.contains(pending.id));
    assert_eq!(snapshot.total, 4);
    assert_eq!(id, CommentId::Confirmed(42));
}

#[tokio::test]
async fn unreadable_server_copy_still_counts_as_posted() {
    let fake = FakeLabs::with(1, vec![dto(1, None, 8, "first")]);
    let notices = Notices::default();
    let mut notice_rx = notices.subscribe();
    let thread = manager(&fake, 10, &notices);
    thread.load_page(1).await.unwrap();
    fake.garble_created.store(true, Ordering::SeqCst);

    let id = thread.create_comment("hello", None).await.unwrap();

    assert_eq!(id, CommentId::Confirmed(42));
    assert_eq!(fake.stored(1), 2);
    let snapshot = thread.snapshot();
    assert!(snapshot.tree.pending().is_empty());
    // The reload picked up the stored copy.
    assert!(snapshot.tree.contains(id));
    assert_eq!(snapshot.tree.len(), 2);
    assert_eq!(snapshot.total, 2);
    assert_eq!(error_notices(&mut notice_rx), 0);
}
