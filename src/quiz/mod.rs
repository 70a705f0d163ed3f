// src/quiz/mod.rs

pub mod engine;
pub mod timer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    api::LabsApi,
    error::AppError,
    models::question::{AnswerOutcome, AnswerValue, Question, SubmitAnswerRequest},
};

pub use engine::{
    AnswerSubmitter, QuizEngine, QuizEvent, QuizPhase, QuizSettings, QuizSnapshot, QuizSummary,
    Submission,
};

/// Fetches a lab's questions in the order the backend serves them.
pub async fn load_questions(api: &dyn LabsApi, lab_id: i64) -> Result<Vec<Question>, AppError> {
    let questions = api
        .list_questions(lab_id)
        .await?
        .into_iter()
        .map(Question::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(lab_id, count = questions.len(), "questions loaded");
    Ok(questions)
}

/// Grades answers through the lab's answer endpoint.
pub struct LabAnswerSubmitter {
    api: Arc<dyn LabsApi>,
    lab_id: i64,
}

impl LabAnswerSubmitter {
    pub fn new(api: Arc<dyn LabsApi>, lab_id: i64) -> Self {
        Self { api, lab_id }
    }
}

#[async_trait]
impl AnswerSubmitter for LabAnswerSubmitter {
    async fn submit_answer(
        &self,
        question: &Question,
        answer: &AnswerValue,
    ) -> Result<AnswerOutcome, AppError> {
        let request = SubmitAnswerRequest::new(answer)?;
        let result = self
            .api
            .submit_answer(self.lab_id, question.id, &request)
            .await?;

        tracing::debug!(
            question_id = question.id,
            is_correct = result.is_correct,
            awarded_xp = result.awarded_xp,
            "answer graded"
        );
        Ok(result.into())
    }
}
