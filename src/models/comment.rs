use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::AppError, models::user::SessionUser, utils::time::parse_timestamp};

/// Identifier of a comment in the local thread.
///
/// `Pending` marks an optimistic comment the server has not confirmed yet; its
/// token is local to this client and is never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommentId {
    Confirmed(i64),
    Pending(u64),
}

impl CommentId {
    pub fn is_pending(self) -> bool {
        matches!(self, CommentId::Pending(_))
    }

    pub fn confirmed(self) -> Option<i64> {
        match self {
            CommentId::Confirmed(id) => Some(id),
            CommentId::Pending(_) => None,
        }
    }
}

impl From<i64> for CommentId {
    fn from(id: i64) -> Self {
        CommentId::Confirmed(id)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentId::Confirmed(id) => write!(f, "{}", id),
            CommentId::Pending(token) => write!(f, "pending-{}", token),
        }
    }
}

/// DTO for a comment as listed or returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub user_id: i64,
    pub content: String,
    /// May arrive without a timezone; see `utils::time::normalize_timestamp`.
    pub created_at: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Set when the comment was soft-deleted but still has replies to show.
    #[serde(default)]
    pub deleted_at: Option<String>,
}

/// One page of `GET /labs/{labId}/comments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPage {
    pub items: Vec<CommentDto>,
    pub total: u64,
}

/// A comment held in the local thread, confirmed or optimistic.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    /// 0 for an optimistic comment whose author has no known id yet.
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub author_role: Option<String>,
    pub is_sending: bool,
    pub is_deleted: bool,
}

impl TryFrom<CommentDto> for Comment {
    type Error = AppError;

    fn try_from(dto: CommentDto) -> Result<Self, Self::Error> {
        Ok(Comment {
            id: CommentId::Confirmed(dto.id),
            parent_id: dto.parent_id.map(CommentId::Confirmed),
            user_id: dto.user_id,
            content: dto.content,
            created_at: parse_timestamp(&dto.created_at)?,
            author_name: dto.username,
            author_avatar_url: dto.avatar_url,
            author_role: dto.role,
            is_sending: false,
            is_deleted: dto.deleted_at.is_some(),
        })
    }
}

impl Comment {
    /// Builds the optimistic node shown while a create request is in flight.
    pub fn pending(
        token: u64,
        parent_id: Option<i64>,
        content: String,
        author: &SessionUser,
        now: DateTime<Utc>,
    ) -> Self {
        Comment {
            id: CommentId::Pending(token),
            parent_id: parent_id.map(CommentId::Confirmed),
            user_id: author.id,
            content,
            created_at: now,
            author_name: author.username.clone(),
            author_avatar_url: author.avatar_url.clone(),
            author_role: Some(author.role.clone()),
            is_sending: true,
            is_deleted: false,
        }
    }
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(
        length(
            min = 1,
            max = 1000,
            message = "Comment must be between 1 and 1000 characters"
        ),
        custom(function = validate_not_blank)
    )]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// Body of `PATCH /labs/comments/{commentId}`.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(
        length(
            min = 1,
            max = 1000,
            message = "Comment must be between 1 and 1000 characters"
        ),
        custom(function = validate_not_blank)
    )]
    pub content: String,
}

fn validate_not_blank(content: &str) -> Result<(), validator::ValidationError> {
    if content.trim().is_empty() {
        return Err(validator::ValidationError::new("content_cannot_be_blank"));
    }
    Ok(())
}
