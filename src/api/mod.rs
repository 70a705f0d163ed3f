// src/api/mod.rs

pub mod http;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        comment::{CommentDto, CommentPage},
        question::{AnswerResult, QuestionDto, SubmitAnswerRequest},
    },
};

pub use http::HttpBackend;

/// The REST endpoints the quiz and the comment thread consume.
///
/// Every call either resolves or fails with an `AppError`; timeouts are the
/// implementation's responsibility.
#[async_trait]
pub trait LabsApi: Send + Sync {
    /// `GET /labs/{id}/questions`
    async fn list_questions(&self, lab_id: i64) -> Result<Vec<QuestionDto>, AppError>;

    /// `POST /labs/{labId}/questions/{questionId}/answers`
    async fn submit_answer(
        &self,
        lab_id: i64,
        question_id: i64,
        request: &SubmitAnswerRequest,
    ) -> Result<AnswerResult, AppError>;

    /// `GET /labs/{labId}/comments?page=&pageSize=`
    async fn list_comments(
        &self,
        lab_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, AppError>;

    /// `POST /labs/{labId}/comments?parentId=`
    async fn create_comment(
        &self,
        lab_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<CommentDto, AppError>;

    /// `PATCH /labs/comments/{commentId}`
    async fn update_comment(&self, comment_id: i64, content: &str) -> Result<(), AppError>;

    /// `DELETE /labs/comments/{commentId}`
    async fn delete_comment(&self, comment_id: i64) -> Result<(), AppError>;
}
