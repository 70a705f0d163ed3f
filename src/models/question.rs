// src/models/question.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Question kind, sent by the backend as a numeric discriminant (0..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    ShortText,
}

impl QuestionType {
    /// Whether the question carries a list of options.
    pub fn has_choices(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultipleChoice)
    }

    /// Selecting an option submits immediately; the other kinds need an explicit submit.
    pub fn submits_on_select(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::TrueFalse)
    }
}

impl TryFrom<u8> for QuestionType {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QuestionType::SingleChoice),
            1 => Ok(QuestionType::MultipleChoice),
            2 => Ok(QuestionType::TrueFalse),
            3 => Ok(QuestionType::ShortText),
            other => Err(AppError::BadRequest(format!("Unknown question type: {}", other))),
        }
    }
}

impl From<QuestionType> for u8 {
    fn from(value: QuestionType) -> Self {
        match value {
            QuestionType::SingleChoice => 0,
            QuestionType::MultipleChoice => 1,
            QuestionType::TrueFalse => 2,
            QuestionType::ShortText => 3,
        }
    }
}

/// DTO returned by `GET /labs/{id}/questions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: i64,
    pub lab_id: i64,
    pub question_text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// JSON-encoded `string[]`; absent or empty for true/false and short text.
    #[serde(default)]
    pub choices_json: Option<String>,
}

/// One quiz item, immutable for the duration of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub choices: Vec<String>,
}

impl TryFrom<QuestionDto> for Question {
    type Error = AppError;

    fn try_from(dto: QuestionDto) -> Result<Self, Self::Error> {
        let choices = if dto.question_type.has_choices() {
            let raw = dto.choices_json.as_deref().unwrap_or("").trim();
            let choices: Vec<String> = if raw.is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(raw)?
            };
            if choices.len() < 2 {
                return Err(AppError::BadRequest(format!(
                    "Question {} needs at least two choices",
                    dto.id
                )));
            }
            choices
        } else {
            Vec::new()
        };

        Ok(Question {
            id: dto.id,
            text: dto.question_text,
            question_type: dto.question_type,
            choices,
        })
    }
}

impl Question {
    /// Checks that an answer has the shape this question's type requires.
    pub fn check_answer(&self, answer: &AnswerValue) -> Result<(), AppError> {
        match (self.question_type, answer) {
            (QuestionType::SingleChoice, AnswerValue::Text(choice)) => {
                if self.choices.contains(choice) {
                    Ok(())
                } else {
                    Err(AppError::BadRequest(format!("'{}' is not one of the choices", choice)))
                }
            }
            (QuestionType::MultipleChoice, AnswerValue::Choices(selected)) => {
                if selected.is_empty() {
                    return Err(AppError::BadRequest("Select at least one option".to_string()));
                }
                let mut seen = HashSet::new();
                for choice in selected {
                    if !self.choices.contains(choice) {
                        return Err(AppError::BadRequest(format!(
                            "'{}' is not one of the choices",
                            choice
                        )));
                    }
                    if !seen.insert(choice) {
                        return Err(AppError::BadRequest(format!("'{}' selected twice", choice)));
                    }
                }
                Ok(())
            }
            (QuestionType::TrueFalse, AnswerValue::Flag(_)) => Ok(()),
            (QuestionType::ShortText, AnswerValue::Text(text)) => {
                if text.trim().is_empty() {
                    Err(AppError::BadRequest("Answer cannot be empty".to_string()))
                } else {
                    Ok(())
                }
            }
            (kind, _) => Err(AppError::BadRequest(format!(
                "Answer shape does not match a {:?} question",
                kind
            ))),
        }
    }
}

/// An answer, shaped by the owning question's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Text(String),
    Choices(Vec<String>),
}

/// Body of `POST /labs/{labId}/questions/{questionId}/answers`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub answer_json: String,
}

impl SubmitAnswerRequest {
    pub fn new(answer: &AnswerValue) -> Result<Self, AppError> {
        Ok(Self {
            answer_json: serde_json::to_string(answer)?,
        })
    }
}

/// Response of the answer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub is_correct: bool,
    pub awarded_xp: i64,
    #[serde(default)]
    pub lab_completed: bool,
    #[serde(default)]
    pub total_user_xp: Option<i64>,
    #[serde(default)]
    pub new_level: Option<i32>,
}

/// What the quiz engine keeps from a graded answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub awarded_xp: u64,
    pub lab_completed: bool,
    pub new_level: Option<i32>,
}

impl AnswerOutcome {
    /// Outcome used when the backend could not grade the answer.
    pub fn failed() -> Self {
        Self::default()
    }
}

impl From<AnswerResult> for AnswerOutcome {
    fn from(result: AnswerResult) -> Self {
        Self {
            is_correct: result.is_correct,
            // Negative awards would break the non-decreasing score.
            awarded_xp: result.awarded_xp.max(0) as u64,
            lab_completed: result.lab_completed,
            new_level: result.new_level,
        }
    }
}
