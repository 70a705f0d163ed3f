// src/main.rs

use std::sync::Arc;

use chrono::Utc;
use labs_client::{
    api::{HttpBackend, LabsApi},
    comments::{CollapseState, CommentManager, MAX_VISUAL_DEPTH, view, visible_rows},
    config::Config,
    error::AppError,
    models::question::{AnswerValue, Question, QuestionType},
    notice::{NoticeEvent, NoticeKind, Notices},
    quiz::{self, LabAnswerSubmitter, QuizEngine, QuizEvent, QuizSettings, Submission},
    utils::{
        jwt,
        time::{local_display, relative_time},
    },
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: labs-client [quiz | comments [--collapsed] | post <text> [parent-id]]";

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e.user_message());
            std::process::exit(2);
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "labs-client.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    // Stdout belongs to the quiz prompt.
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Err(e) = run(config).await {
        tracing::error!("labs-client failed: {}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let lab_id = config
        .lab_id
        .ok_or_else(|| AppError::BadRequest("LAB_ID must be set".to_string()))?;

    if let Some(token) = &config.api_token {
        warn_if_expired(token);
    }

    let backend = Arc::new(HttpBackend::from_config(&config)?);
    let notices = Notices::new(config.notice_dismiss());
    spawn_notice_printer(&notices);

    match args.first().map(String::as_str).unwrap_or("quiz") {
        "quiz" => run_quiz(&config, backend, lab_id, notices).await,
        "comments" => {
            let collapsed = args.get(1).is_some_and(|a| a == "--collapsed");
            show_comments(&config, backend, lab_id, notices, collapsed).await
        }
        "post" => {
            let content = args
                .get(1)
                .ok_or_else(|| AppError::BadRequest(USAGE.to_string()))?;
            let parent_id = args
                .get(2)
                .map(|raw| raw.parse::<i64>())
                .transpose()
                .map_err(|_| AppError::BadRequest(USAGE.to_string()))?;
            post_comment(&config, backend, lab_id, notices, content, parent_id).await
        }
        _ => Err(AppError::BadRequest(USAGE.to_string())),
    }
}

fn warn_if_expired(token: &str) {
    match jwt::read_claims(token) {
        Ok(claims) => {
            if let Some(expired_at) = claims.expires_at().filter(|exp| *exp <= Utc::now()) {
                tracing::warn!(
                    "API token expired at {}; the server will reject it",
                    local_display(expired_at)
                );
            }
        }
        Err(e) => tracing::warn!("API token is not a readable JWT: {}", e),
    }
}

fn spawn_notice_printer(notices: &Notices) {
    let mut rx = notices.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(NoticeEvent::Shown(notice)) => {
                    let tag = match notice.kind {
                        NoticeKind::Success => "ok",
                        NoticeKind::Info => "info",
                        NoticeKind::Warning => "!",
                        NoticeKind::Error => "error",
                    };
                    println!("  [{}] {}", tag, notice.message);
                }
                Ok(NoticeEvent::Dismissed(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notice printer lagged");
                }
                Err(RecvError::Closed) => return,
            }
        }
    });
}

async fn run_quiz(
    config: &Config,
    backend: Arc<HttpBackend>,
    lab_id: i64,
    notices: Notices,
) -> Result<(), AppError> {
    let api: Arc<dyn LabsApi> = backend;
    let questions = quiz::load_questions(api.as_ref(), lab_id).await?;
    let submitter = Arc::new(LabAnswerSubmitter::new(Arc::clone(&api), lab_id));
    let engine = QuizEngine::new(questions, QuizSettings::from(config), submitter, notices)?;

    println!(
        "{} questions, {} seconds each. Press Enter to start.",
        engine.question_count(),
        engine.settings().duration_seconds
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if lines.next_line().await?.is_none() {
        return Ok(());
    }

    let mut events = engine.subscribe();
    engine.start()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(QuizEvent::QuestionStarted { index, .. }) => {
                    if let Some(question) = engine.current_question() {
                        print_question(index, engine.question_count(), &question);
                    }
                }
                Ok(QuizEvent::UrgentTick { remaining_seconds }) => {
                    println!("  ... {}s left", remaining_seconds);
                }
                Ok(QuizEvent::Finished(summary)) => {
                    println!();
                    println!(
                        "Done! {} of {} correct, {} XP earned.",
                        summary.correct, summary.total, summary.score
                    );
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "quiz events lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    engine.shutdown();
                    break;
                };
                handle_input(&engine, line.trim()).await;
            }
        }
    }

    Ok(())
}

fn print_question(index: usize, total: usize, question: &Question) {
    println!();
    println!("Question {}/{}: {}", index + 1, total, question.text);
    match question.question_type {
        QuestionType::SingleChoice | QuestionType::MultipleChoice => {
            for (i, choice) in question.choices.iter().enumerate() {
                println!("  {}) {}", i + 1, choice);
            }
            if question.question_type == QuestionType::MultipleChoice {
                println!("  (type numbers to toggle, empty line to submit)");
            }
        }
        QuestionType::TrueFalse => println!("  (t)rue / (f)alse"),
        QuestionType::ShortText => println!("  (type your answer)"),
    }
}

async fn handle_input(engine: &QuizEngine, input: &str) {
    let Some(question) = engine.current_question() else {
        return;
    };

    let result = match question.question_type {
        QuestionType::SingleChoice => match pick_choice(&question, input) {
            Some(choice) => engine.answer_changed(AnswerValue::Text(choice)).await,
            None => {
                println!("  Pick a number between 1 and {}", question.choices.len());
                return;
            }
        },
        QuestionType::TrueFalse => match input.to_lowercase().as_str() {
            "t" | "true" | "y" | "yes" => engine.answer_changed(AnswerValue::Flag(true)).await,
            "f" | "false" | "n" | "no" => engine.answer_changed(AnswerValue::Flag(false)).await,
            _ => {
                println!("  Answer t or f");
                return;
            }
        },
        QuestionType::MultipleChoice if input.is_empty() => engine.submit_current().await,
        QuestionType::MultipleChoice => {
            for token in input.split(|c: char| c == ',' || c.is_whitespace()) {
                let Some(choice) = pick_choice(&question, token) else {
                    continue;
                };
                if let Err(e) = engine.toggle_choice(&choice) {
                    println!("  {}", e.user_message());
                }
            }
            if let Some(AnswerValue::Choices(selected)) = engine.draft() {
                println!("  selected: {}", selected.join(", "));
            }
            return;
        }
        QuestionType::ShortText => match engine.answer_changed(AnswerValue::Text(input.to_string())).await {
            Ok(_) => engine.submit_current().await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(Submission::Ignored) => tracing::debug!("input ignored in current phase"),
        Ok(_) => {}
        Err(e) => println!("  {}", e.user_message()),
    }
}

fn pick_choice(question: &Question, input: &str) -> Option<String> {
    let n = input.trim().parse::<usize>().ok()?;
    question.choices.get(n.checked_sub(1)?).cloned()
}

fn comment_manager(
    config: &Config,
    backend: Arc<HttpBackend>,
    lab_id: i64,
    notices: Notices,
) -> CommentManager {
    let manager = CommentManager::new(backend, Some(lab_id), config.comments_page_size, notices);
    if let Some(token) = &config.api_token {
        match jwt::session_user(token) {
            Ok(user) => manager.set_user(Some(user)),
            Err(e) => tracing::warn!("Could not read session user from token: {}", e),
        }
    }
    manager
}

async fn show_comments(
    config: &Config,
    backend: Arc<HttpBackend>,
    lab_id: i64,
    notices: Notices,
    collapsed: bool,
) -> Result<(), AppError> {
    let manager = comment_manager(config, backend, lab_id, notices);
    manager.load_page(1).await?;

    let thread = manager.snapshot();
    let now = Utc::now();
    println!("{} comments", thread.total);

    // Folds every top-level reply group.
    let mut collapse = CollapseState::default();
    if collapsed {
        for root in thread.tree.roots() {
            if !thread.tree.children(*root).is_empty() {
                collapse.toggle(*root);
            }
        }
    }

    for row in visible_rows(&thread.tree, &collapse, MAX_VISUAL_DEPTH) {
        let Some(comment) = thread.tree.get(row.id) else {
            continue;
        };
        let indent = "  ".repeat(row.indent);
        let border = if row.boxed { "| " } else { "" };
        let folded = if row.collapsed && row.reply_count > 0 {
            format!(" [+{} replies]", row.reply_count)
        } else {
            String::new()
        };
        println!(
            "{}{}#{} {} ({}, {}): {}{}",
            indent,
            border,
            comment.id,
            comment.author_name,
            relative_time(comment.created_at, now),
            local_display(comment.created_at),
            view::display_body(comment),
            folded
        );
    }

    if thread.has_more {
        println!("... more comments on the next page");
    }
    Ok(())
}

async fn post_comment(
    config: &Config,
    backend: Arc<HttpBackend>,
    lab_id: i64,
    notices: Notices,
    content: &str,
    parent_id: Option<i64>,
) -> Result<(), AppError> {
    let manager = comment_manager(config, backend, lab_id, notices);
    manager.load_page(1).await?;
    let id = manager.create_comment(content, parent_id).await?;
    println!("posted comment #{}", id);
    Ok(())
}
