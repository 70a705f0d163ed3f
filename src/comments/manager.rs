// src/comments/manager.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use validator::Validate;

use crate::{
    api::LabsApi,
    comments::tree::CommentTree,
    error::AppError,
    models::{
        comment::{Comment, CommentId, CreateCommentRequest, UpdateCommentRequest},
        user::SessionUser,
    },
    notice::Notices,
};

/// Read-only copy of the thread for rendering.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub tree: CommentTree,
    /// Server-reported total, nudged locally for optimistic adds and local removals.
    pub total: u64,
    pub page: u32,
    pub has_more: bool,
}

struct ThreadState {
    lab_id: Option<i64>,
    user: Option<SessionUser>,
    tree: CommentTree,
    total: u64,
    page: u32,
    /// Bumped whenever the lab changes or the view goes away; stale completions are dropped.
    generation: u64,
}

struct Inner {
    api: Arc<dyn LabsApi>,
    notices: Notices,
    page_size: u32,
    next_token: AtomicU64,
    state: Mutex<ThreadState>,
}

/// Threaded discussion of one lab, with optimistic posting.
///
/// Cheap to clone; clones share the same thread, so independent operations can
/// run concurrently and each completion applies to the latest state.
#[derive(Clone)]
pub struct CommentManager {
    inner: Arc<Inner>,
}

impl CommentManager {
    pub fn new(
        api: Arc<dyn LabsApi>,
        lab_id: Option<i64>,
        page_size: u32,
        notices: Notices,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                notices,
                page_size: page_size.max(1),
                next_token: AtomicU64::new(1),
                state: Mutex::new(ThreadState {
                    lab_id,
                    user: None,
                    tree: CommentTree::default(),
                    total: 0,
                    page: 0,
                    generation: 0,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThreadState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets who is signed in; used to stamp optimistic comments and for edit rights.
    pub fn set_user(&self, user: Option<SessionUser>) {
        self.lock().user = user;
    }

    /// Points the manager at another lab (or none). The thread is cleared and
    /// results of requests made for the previous lab are ignored.
    pub fn set_lab(&self, lab_id: Option<i64>) {
        let mut s = self.lock();
        s.lab_id = lab_id;
        s.generation += 1;
        s.tree = CommentTree::default();
        s.total = 0;
        s.page = 0;
    }

    /// The hosting view is gone; nothing in flight may touch the thread any more.
    pub fn shutdown(&self) {
        self.set_lab(None);
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        let s = self.lock();
        ThreadSnapshot {
            tree: s.tree.clone(),
            total: s.total,
            page: s.page,
            has_more: u64::from(s.page) * u64::from(self.inner.page_size) < s.total,
        }
    }

    pub fn has_more(&self) -> bool {
        self.snapshot().has_more
    }

    pub fn can_edit(&self, comment: &Comment) -> bool {
        let s = self.lock();
        is_author(s.user.as_ref(), comment) && !comment.id.is_pending() && !comment.is_deleted
    }

    pub fn can_delete(&self, comment: &Comment) -> bool {
        let s = self.lock();
        is_author(s.user.as_ref(), comment) || s.user.as_ref().is_some_and(|u| u.is_admin())
    }

    /// Loads page `n` (1-based).
    ///
    /// Page 1 replaces the thread; later pages are merged into what is already
    /// loaded so replies from earlier pages stay attached. Optimistic comments
    /// survive either way. Does nothing while no lab is selected.
    pub async fn load_page(&self, n: u32) -> Result<(), AppError> {
        let n = n.max(1);
        let (lab_id, generation) = {
            let s = self.lock();
            match s.lab_id {
                Some(lab_id) => (lab_id, s.generation),
                None => {
                    tracing::debug!("no lab selected, comments not loaded");
                    return Ok(());
                }
            }
        };

        let page = match self
            .inner
            .api
            .list_comments(lab_id, n, self.inner.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(lab_id, page = n, "Failed to load comments: {}", e);
                self.inner
                    .notices
                    .error(format!("Could not load comments. {}", e.user_message()));
                return Err(e);
            }
        };

        let fetched: Vec<Comment> = page
            .items
            .into_iter()
            .filter_map(|dto| {
                let id = dto.id;
                Comment::try_from(dto)
                    .map_err(|e| tracing::warn!(id, "Skipping malformed comment: {}", e))
                    .ok()
            })
            .collect();

        let mut s = self.lock();
        if s.generation != generation {
            tracing::debug!(lab_id, page = n, "stale comments page dropped");
            return Ok(());
        }

        if n == 1 {
            let pending = s.tree.pending();
            s.tree = CommentTree::build(fetched);
            s.tree.graft_pending(pending);
            s.page = 1;
        } else {
            let mut records = s.tree.flatten();
            records.extend(fetched);
            s.tree = CommentTree::build(records);
            s.page = s.page.max(n);
        }
        // Replies still in flight are shown but not yet counted by the server.
        s.total = page.total + s.tree.pending().len() as u64;

        tracing::debug!(lab_id, page = n, loaded = s.tree.len(), total = s.total, "comments loaded");
        Ok(())
    }

    pub async fn load_more(&self) -> Result<(), AppError> {
        let next = self.lock().page + 1;
        self.load_page(next).await
    }

    /// Posts a comment or a reply, showing it immediately as pending.
    ///
    /// On success the pending node becomes the server's comment and page 1 is
    /// reloaded; on failure the pending node is removed again. A reply the
    /// server stored but sent back unreadable still counts as posted.
    pub async fn create_comment(
        &self,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<CommentId, AppError> {
        let request = CreateCommentRequest {
            content: content.to_string(),
            parent_id,
        };
        request.validate()?;

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let temp_id = CommentId::Pending(token);
        let (lab_id, generation) = {
            let mut s = self.lock();
            let lab_id = s
                .lab_id
                .ok_or_else(|| AppError::BadRequest("No lab selected".to_string()))?;
            let user = s
                .user
                .clone()
                .ok_or_else(|| AppError::AuthError("Sign in to comment".to_string()))?;

            let pending = Comment::pending(token, parent_id, request.content.clone(), &user, Utc::now());
            s.tree.insert(pending)?;
            s.total += 1;
            (lab_id, s.generation)
        };

        let created = self
            .inner
            .api
            .create_comment(lab_id, &request.content, request.parent_id)
            .await;

        match created {
            Ok(dto) => {
                let id = CommentId::Confirmed(dto.id);
                {
                    let mut s = self.lock();
                    match Comment::try_from(dto) {
                        Ok(comment) => {
                            if s.generation == generation && !s.tree.replace(temp_id, comment) {
                                tracing::debug!(%temp_id, %id, "pending comment was removed before confirmation");
                            }
                        }
                        // Stored server-side; the reload below brings in whatever it can read.
                        Err(e) => {
                            tracing::warn!(%id, "Posted comment could not be decoded: {}", e);
                            if s.generation == generation {
                                let removed = s.tree.remove(temp_id) as u64;
                                s.total = s.total.saturating_sub(removed);
                            }
                        }
                    }
                }
                tracing::info!(lab_id, %id, "comment posted");
                self.inner.notices.success("Comment posted");

                // Pick up server-side sanitising and derived fields.
                if let Err(e) = self.load_page(1).await {
                    tracing::debug!("Refresh after posting failed: {}", e);
                }
                Ok(id)
            }
            Err(e) => {
                {
                    let mut s = self.lock();
                    if s.generation == generation {
                        let removed = s.tree.remove(temp_id) as u64;
                        s.total = s.total.saturating_sub(removed);
                    }
                }
                tracing::warn!(lab_id, "Failed to post comment: {}", e);
                self.inner
                    .notices
                    .error(format!("Could not post your comment. {}", e.user_message()));
                Err(e)
            }
        }
    }

    /// Edits a confirmed comment of the signed-in user. The thread only
    /// changes once the server accepted the edit.
    pub async fn update_comment(&self, id: CommentId, content: &str) -> Result<(), AppError> {
        let request = UpdateCommentRequest {
            content: content.to_string(),
        };
        request.validate()?;

        let Some(comment_id) = id.confirmed() else {
            return Err(AppError::BadRequest(
                "This comment is still being sent".to_string(),
            ));
        };

        let generation = {
            let s = self.lock();
            let comment = s
                .tree
                .get(id)
                .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))?;
            if !is_author(s.user.as_ref(), comment) {
                return Err(AppError::AuthError(
                    "You can only edit your own comments".to_string(),
                ));
            }
            s.generation
        };

        match self
            .inner
            .api
            .update_comment(comment_id, &request.content)
            .await
        {
            Ok(()) => {
                let mut s = self.lock();
                if s.generation == generation {
                    s.tree.update_content(id, &request.content);
                }
                tracing::debug!(%id, "comment updated");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%id, "Failed to update comment: {}", e);
                self.inner
                    .notices
                    .error(format!("Could not save your edit. {}", e.user_message()));
                Err(e)
            }
        }
    }

    /// Deletes a comment.
    ///
    /// A pending comment was never stored, so it is just dropped locally. A
    /// confirmed one is deleted on the server and page 1 is reloaded.
    pub async fn delete_comment(&self, id: CommentId) -> Result<(), AppError> {
        let generation = {
            let mut s = self.lock();
            if id.is_pending() {
                let removed = s.tree.remove(id) as u64;
                if removed == 0 {
                    return Err(AppError::NotFound(format!("Comment {} not found", id)));
                }
                s.total = s.total.saturating_sub(removed);
                tracing::debug!(%id, "pending comment discarded");
                return Ok(());
            }

            let comment = s
                .tree
                .get(id)
                .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))?;

            let allowed = is_author(s.user.as_ref(), comment)
                || s.user.as_ref().is_some_and(|u| u.is_admin());
            if !allowed {
                return Err(AppError::AuthError(
                    "You can only delete your own comments".to_string(),
                ));
            }
            s.generation
        };

        let Some(comment_id) = id.confirmed() else {
            return Ok(());
        };

        match self.inner.api.delete_comment(comment_id).await {
            Ok(()) => {
                tracing::info!(%id, "comment deleted");
                if self.lock().generation == generation {
                    if let Err(e) = self.load_page(1).await {
                        tracing::debug!("Refresh after delete failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%id, "Failed to delete comment: {}", e);
                self.inner
                    .notices
                    .error(format!("Could not delete the comment. {}", e.user_message()));
                Err(e)
            }
        }
    }
}

/// Client-side convenience check only; the server decides.
fn is_author(user: Option<&SessionUser>, comment: &Comment) -> bool {
    user.is_some_and(|u| u.id == comment.user_id && u.id != 0)
}
