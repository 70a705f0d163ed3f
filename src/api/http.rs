// src/api/http.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use url::Url;

use crate::{
    api::LabsApi,
    config::Config,
    error::AppError,
    models::{
        comment::{CommentDto, CommentPage, UpdateCommentRequest},
        question::{AnswerResult, QuestionDto, SubmitAnswerRequest},
    },
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// `LabsApi` over JSON/HTTPS with bearer-token authentication.
#[derive(Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::BadRequest(format!(
                "API base URL cannot hold paths: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(&config.api_base_url, config.api_token.clone())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejected cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and turns any non-2xx status into an `AppError`.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Request failed before a response: {}", e);
            AppError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let err = AppError::from_status(status, &body);
        if status.is_server_error() {
            tracing::error!(%url, %status, "Backend error: {}", err);
        } else {
            tracing::warn!(%url, %status, "Request rejected: {}", err);
        }
        Err(err)
    }
}

#[async_trait]
impl LabsApi for HttpBackend {
    async fn list_questions(&self, lab_id: i64) -> Result<Vec<QuestionDto>, AppError> {
        let url = self.endpoint(&["labs", &lab_id.to_string(), "questions"]);
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    async fn submit_answer(
        &self,
        lab_id: i64,
        question_id: i64,
        request: &SubmitAnswerRequest,
    ) -> Result<AnswerResult, AppError> {
        let url = self.endpoint(&[
            "labs",
            &lab_id.to_string(),
            "questions",
            &question_id.to_string(),
            "answers",
        ]);
        let response = self
            .send(self.request(Method::POST, url).json(request))
            .await?;
        Ok(response.json().await?)
    }

    async fn list_comments(
        &self,
        lab_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, AppError> {
        let mut url = self.endpoint(&["labs", &lab_id.to_string(), "comments"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());

        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    async fn create_comment(
        &self,
        lab_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<CommentDto, AppError> {
        let mut url = self.endpoint(&["labs", &lab_id.to_string(), "comments"]);
        if let Some(parent_id) = parent_id {
            url.query_pairs_mut()
                .append_pair("parentId", &parent_id.to_string());
        }

        // The body is the content itself, as a JSON string.
        let response = self
            .send(self.request(Method::POST, url).json(content))
            .await?;
        Ok(response.json().await?)
    }

    async fn update_comment(&self, comment_id: i64, content: &str) -> Result<(), AppError> {
        let url = self.endpoint(&["labs", "comments", &comment_id.to_string()]);
        let body = UpdateCommentRequest {
            content: content.to_string(),
        };
        self.send(self.request(Method::PATCH, url).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<(), AppError> {
        let url = self.endpoint(&["labs", "comments", &comment_id.to_string()]);
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
