// src/quiz/engine.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::question::{AnswerOutcome, AnswerValue, Question, QuestionType},
    notice::Notices,
    quiz::timer::{self, Step},
};

/// Grades one answer. Implemented over the backend's answer endpoint.
#[async_trait]
pub trait AnswerSubmitter: Send + Sync {
    async fn submit_answer(
        &self,
        question: &Question,
        answer: &AnswerValue,
    ) -> Result<AnswerOutcome, AppError>;
}

/// Timing knobs of a quiz session.
#[derive(Debug, Clone, Validate)]
pub struct QuizSettings {
    /// Time limit for every question.
    #[validate(range(min = 1, message = "Questions need at least one second"))]
    pub duration_seconds: u32,
    /// How long correct/incorrect highlighting stays before the next question.
    pub feedback_hold: Duration,
    /// Pause between running out of time and moving on.
    pub expiry_delay: Duration,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            duration_seconds: 30,
            feedback_hold: Duration::from_millis(800),
            expiry_delay: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for QuizSettings {
    fn from(config: &Config) -> Self {
        Self {
            duration_seconds: config.question_seconds,
            feedback_hold: Duration::from_millis(config.feedback_hold_ms),
            expiry_delay: Duration::from_millis(config.expiry_delay_ms),
        }
    }
}

/// `NotStarted -> (Answering -> Submitting -> Feedback | Answering -> TimeUp)* -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    NotStarted,
    Answering,
    Submitting,
    Feedback,
    TimeUp,
    Finished,
}

impl QuizPhase {
    pub fn is_running(self) -> bool {
        !matches!(self, QuizPhase::NotStarted | QuizPhase::Finished)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizSummary {
    pub total: usize,
    pub correct: usize,
    pub score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizSnapshot {
    pub phase: QuizPhase,
    pub index: usize,
    pub total: usize,
    pub score: u64,
    pub correct_count: usize,
    pub remaining_seconds: u32,
}

/// Published to the presentation layer as the session moves.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizEvent {
    QuestionStarted {
        index: usize,
        question_id: i64,
        remaining_seconds: u32,
    },
    Tick {
        remaining_seconds: u32,
    },
    /// Audio/visual urgency cue, once per second in the last five seconds.
    UrgentTick {
        remaining_seconds: u32,
    },
    TimeUp {
        index: usize,
        question_id: i64,
    },
    Feedback {
        question_id: i64,
        outcome: AnswerOutcome,
    },
    Finished(QuizSummary),
}

/// Result of handing an answer to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Kept as the draft; needs an explicit submit.
    Buffered,
    Graded(AnswerOutcome),
    /// Not answering right now, another submission is in flight, or the
    /// session was shut down before the grade arrived.
    Ignored,
}

struct Session {
    phase: QuizPhase,
    index: usize,
    answers: HashMap<i64, AnswerValue>,
    draft: Option<AnswerValue>,
    remaining: u32,
    score: u64,
    correct_count: usize,
    submitting: bool,
    /// Set by shutdown; nothing re-arms the session afterwards.
    closed: bool,
    /// Bumped on every question entry and on shutdown; late callbacks compare against it.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    questions: Vec<Question>,
    settings: QuizSettings,
    submitter: Arc<dyn AnswerSubmitter>,
    notices: Notices,
    events: broadcast::Sender<QuizEvent>,
    session: Mutex<Session>,
}

impl Session {
    fn accepts_input(&self) -> bool {
        self.phase == QuizPhase::Answering && !self.submitting && !self.closed
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: QuizEvent) {
        let _ = self.events.send(event);
    }

    fn summary(&self, s: &Session) -> QuizSummary {
        QuizSummary {
            total: self.questions.len(),
            correct: s.correct_count,
            score: s.score,
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(timer) = session.timer.take() {
            timer.abort();
        }
    }
}

/// Timed, one-question-at-a-time quiz session.
///
/// Cloning gives another handle to the same session. Dropping every handle (or
/// calling [`QuizEngine::shutdown`]) stops the countdown and discards late results.
#[derive(Clone)]
pub struct QuizEngine {
    shared: Arc<Shared>,
}

impl QuizEngine {
    pub fn new(
        questions: Vec<Question>,
        settings: QuizSettings,
        submitter: Arc<dyn AnswerSubmitter>,
        notices: Notices,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        if questions.is_empty() {
            return Err(AppError::BadRequest("A quiz needs at least one question".to_string()));
        }
        if let Some(q) = questions
            .iter()
            .find(|q| q.question_type.has_choices() && q.choices.len() < 2)
        {
            return Err(AppError::BadRequest(format!(
                "Question {} needs at least two choices",
                q.id
            )));
        }

        let (events, _) = broadcast::channel(128);
        let session = Session {
            phase: QuizPhase::NotStarted,
            index: 0,
            answers: HashMap::new(),
            draft: None,
            remaining: settings.duration_seconds,
            score: 0,
            correct_count: 0,
            submitting: false,
            closed: false,
            generation: 0,
            timer: None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                questions,
                settings,
                submitter,
                notices,
                events,
                session: Mutex::new(session),
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuizEvent> {
        self.shared.events.subscribe()
    }

    pub fn settings(&self) -> &QuizSettings {
        &self.shared.settings
    }

    pub fn question_count(&self) -> usize {
        self.shared.questions.len()
    }

    /// Leaves the start prompt and arms the timer for the first question.
    pub fn start(&self) -> Result<(), AppError> {
        let mut s = self.shared.lock();
        if s.closed {
            return Err(AppError::Conflict("Quiz was shut down".to_string()));
        }
        if s.phase != QuizPhase::NotStarted {
            return Err(AppError::Conflict("Quiz already started".to_string()));
        }
        tracing::info!(questions = self.shared.questions.len(), "quiz started");
        s.index = 0;
        enter_question(&self.shared, &mut s);
        Ok(())
    }

    /// Records a change to the current answer.
    ///
    /// Single choice and true/false submit right away; multiple choice and short
    /// text are only buffered until [`QuizEngine::submit_current`].
    pub async fn answer_changed(&self, value: AnswerValue) -> Result<Submission, AppError> {
        let auto_submit = {
            let mut s = self.shared.lock();
            if !s.accepts_input() {
                return Ok(Submission::Ignored);
            }
            let question = &self.shared.questions[s.index];
            if question.question_type.submits_on_select() {
                question.check_answer(&value)?;
            } else if !draft_shape_matches(question.question_type, &value) {
                return Err(AppError::BadRequest(format!(
                    "Answer shape does not match a {:?} question",
                    question.question_type
                )));
            }
            s.draft = Some(value);
            question.question_type.submits_on_select()
        };

        if auto_submit {
            self.submit_current().await
        } else {
            Ok(Submission::Buffered)
        }
    }

    /// Flips one option of a multiple-choice draft, keeping selection order.
    pub fn toggle_choice(&self, choice: &str) -> Result<Submission, AppError> {
        let mut s = self.shared.lock();
        if !s.accepts_input() {
            return Ok(Submission::Ignored);
        }
        let question = &self.shared.questions[s.index];
        if question.question_type != QuestionType::MultipleChoice {
            return Err(AppError::BadRequest(
                "Only multiple-choice questions can toggle options".to_string(),
            ));
        }
        if !question.choices.iter().any(|c| c == choice) {
            return Err(AppError::BadRequest(format!("'{}' is not one of the choices", choice)));
        }

        let mut selected = match s.draft.take() {
            Some(AnswerValue::Choices(selected)) => selected,
            _ => Vec::new(),
        };
        if let Some(pos) = selected.iter().position(|c| c == choice) {
            selected.remove(pos);
        } else {
            selected.push(choice.to_string());
        }
        s.draft = Some(AnswerValue::Choices(selected));
        Ok(Submission::Buffered)
    }

    /// Submits the buffered answer of the current question.
    ///
    /// At most one submission runs at a time; a second call while one is in
    /// flight returns [`Submission::Ignored`] without reaching the submitter.
    /// Resolves once the session has moved past the question's feedback.
    pub async fn submit_current(&self) -> Result<Submission, AppError> {
        let (question, answer, generation) = {
            let mut s = self.shared.lock();
            if !s.accepts_input() {
                tracing::debug!(phase = ?s.phase, closed = s.closed, "submit ignored");
                return Ok(Submission::Ignored);
            }
            let question = self.shared.questions[s.index].clone();
            let answer = s
                .draft
                .clone()
                .ok_or_else(|| AppError::BadRequest("Choose an answer first".to_string()))?;
            question.check_answer(&answer)?;

            s.submitting = true;
            s.phase = QuizPhase::Submitting;
            if let Some(timer) = s.timer.take() {
                timer.abort();
            }
            s.answers.insert(question.id, answer.clone());
            (question, answer, s.generation)
        };

        // Runs detached so a caller that stops waiting cannot leave the session stuck.
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(run_submission(shared, question, answer, generation));
        let outcome = task
            .await
            .map_err(|e| AppError::InternalServerError(format!("Submission task failed: {}", e)))?;

        Ok(outcome.map_or(Submission::Ignored, Submission::Graded))
    }

    pub fn current_question(&self) -> Option<Question> {
        let s = self.shared.lock();
        if s.phase.is_running() && !s.closed {
            self.shared.questions.get(s.index).cloned()
        } else {
            None
        }
    }

    pub fn draft(&self) -> Option<AnswerValue> {
        self.shared.lock().draft.clone()
    }

    pub fn answers(&self) -> HashMap<i64, AnswerValue> {
        self.shared.lock().answers.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().phase == QuizPhase::Finished
    }

    pub fn snapshot(&self) -> QuizSnapshot {
        let s = self.shared.lock();
        QuizSnapshot {
            phase: s.phase,
            index: s.index,
            total: self.shared.questions.len(),
            score: s.score,
            correct_count: s.correct_count,
            remaining_seconds: s.remaining,
        }
    }

    /// Totals for the result view, once finished.
    pub fn summary(&self) -> Option<QuizSummary> {
        let s = self.shared.lock();
        (s.phase == QuizPhase::Finished).then(|| self.shared.summary(&s))
    }

    /// Tears the session down: the countdown stops and in-flight results are dropped.
    /// Later input is ignored and the session cannot be started again.
    pub fn shutdown(&self) {
        let mut s = self.shared.lock();
        s.closed = true;
        s.generation += 1;
        s.submitting = false;
        if let Some(timer) = s.timer.take() {
            timer.abort();
        }
        tracing::debug!(index = s.index, "quiz shut down");
    }
}

/// Loose shape check for drafts that are still being edited.
fn draft_shape_matches(kind: QuestionType, value: &AnswerValue) -> bool {
    matches!(
        (kind, value),
        (QuestionType::MultipleChoice, AnswerValue::Choices(_))
            | (QuestionType::ShortText, AnswerValue::Text(_))
            | (QuestionType::SingleChoice, AnswerValue::Text(_))
            | (QuestionType::TrueFalse, AnswerValue::Flag(_))
    )
}

/// Arms the question at `s.index`, or finishes the quiz when past the end.
fn enter_question(shared: &Arc<Shared>, s: &mut Session) {
    if let Some(timer) = s.timer.take() {
        timer.abort();
    }
    if s.closed {
        return;
    }
    if s.index >= shared.questions.len() {
        finish(shared, s);
        return;
    }

    s.generation += 1;
    s.phase = QuizPhase::Answering;
    s.submitting = false;
    s.draft = None;
    s.remaining = shared.settings.duration_seconds;

    let question_id = shared.questions[s.index].id;
    tracing::debug!(index = s.index, question_id, "question started");
    shared.emit(QuizEvent::QuestionStarted {
        index: s.index,
        question_id,
        remaining_seconds: s.remaining,
    });
    if timer::is_urgent(s.remaining) {
        shared.emit(QuizEvent::UrgentTick {
            remaining_seconds: s.remaining,
        });
    }

    let generation = s.generation;
    s.timer = Some(tokio::spawn(timer::run_countdown(
        Arc::downgrade(shared),
        Duration::from_secs(1),
        move |shared: &Arc<Shared>| countdown_tick(shared, generation),
        move |shared: &Arc<Shared>| expire_question(shared, generation),
    )));
}

fn countdown_tick(shared: &Shared, generation: u64) -> Step {
    let mut s = shared.lock();
    if s.generation != generation || s.phase != QuizPhase::Answering {
        return Step::Stale;
    }

    s.remaining = timer::tick(s.remaining);
    shared.emit(QuizEvent::Tick {
        remaining_seconds: s.remaining,
    });
    if timer::is_urgent(s.remaining) {
        shared.emit(QuizEvent::UrgentTick {
            remaining_seconds: s.remaining,
        });
    }

    if s.remaining > 0 {
        return Step::Continue;
    }

    s.phase = QuizPhase::TimeUp;
    // The countdown task is the caller; it exits on its own.
    s.timer = None;
    let question_id = shared.questions[s.index].id;
    tracing::debug!(index = s.index, question_id, "question timed out");
    shared.emit(QuizEvent::TimeUp {
        index: s.index,
        question_id,
    });
    shared.notices.warning("Time's up!");
    Step::Expired {
        delay: shared.settings.expiry_delay,
    }
}

fn expire_question(shared: &Arc<Shared>, generation: u64) {
    let mut s = shared.lock();
    if s.generation != generation || s.phase != QuizPhase::TimeUp {
        return;
    }
    // Skipped: nothing goes into `answers` for this question.
    s.index += 1;
    enter_question(shared, &mut s);
}

fn finish(shared: &Shared, s: &mut Session) {
    s.phase = QuizPhase::Finished;
    s.index = shared.questions.len();
    s.remaining = 0;
    s.submitting = false;
    s.draft = None;

    let summary = shared.summary(s);
    tracing::info!(
        total = summary.total,
        correct = summary.correct,
        score = summary.score,
        "quiz finished"
    );
    shared.emit(QuizEvent::Finished(summary));
}

async fn run_submission(
    shared: Arc<Shared>,
    question: Question,
    answer: AnswerValue,
    generation: u64,
) -> Option<AnswerOutcome> {
    let outcome = match shared.submitter.submit_answer(&question, &answer).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(question_id = question.id, "answer submission failed: {}", e);
            shared
                .notices
                .error(format!("Could not submit your answer. {}", e.user_message()));
            AnswerOutcome::failed()
        }
    };

    {
        let mut s = shared.lock();
        if s.generation != generation {
            tracing::debug!(question_id = question.id, "late grade discarded");
            return None;
        }
        s.score += outcome.awarded_xp;
        if outcome.is_correct {
            s.correct_count += 1;
        }
        s.phase = QuizPhase::Feedback;
        shared.emit(QuizEvent::Feedback {
            question_id: question.id,
            outcome,
        });
    }
    announce(&shared.notices, &outcome);

    tokio::time::sleep(shared.settings.feedback_hold).await;

    let mut s = shared.lock();
    if s.generation == generation {
        s.index += 1;
        enter_question(&shared, &mut s);
    }
    Some(outcome)
}

fn announce(notices: &Notices, outcome: &AnswerOutcome) {
    match (outcome.is_correct, outcome.awarded_xp) {
        (true, xp) if xp > 0 => notices.success(format!("Correct! +{} XP", xp)),
        (true, _) => notices.info("Correct! (already credited)"),
        (false, _) => notices.warning("Not quite."),
    };
    if outcome.lab_completed {
        notices.success("Lab completed!");
    }
    if let Some(level) = outcome.new_level {
        notices.success(format!("Level up! You reached level {}", level));
    }
}
