// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub lab_id: Option<i64>,
    pub question_seconds: u32,
    pub comments_page_size: u32,
    pub feedback_hold_ms: u64,
    pub expiry_delay_ms: u64,
    pub notice_dismiss_ms: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let api_base_url = env::var("API_BASE_URL")
            .map_err(|_| AppError::BadRequest("API_BASE_URL must be set".to_string()))?;

        let api_token = env::var("API_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_base_url,
            api_token,
            lab_id: optional_var("LAB_ID")?,
            question_seconds: optional_var("QUIZ_QUESTION_SECONDS")?.unwrap_or(30),
            comments_page_size: optional_var("COMMENTS_PAGE_SIZE")?.unwrap_or(10),
            feedback_hold_ms: optional_var("QUIZ_FEEDBACK_HOLD_MS")?.unwrap_or(800),
            expiry_delay_ms: optional_var("QUIZ_EXPIRY_DELAY_MS")?.unwrap_or(500),
            notice_dismiss_ms: optional_var("NOTICE_DISMISS_MS")?.unwrap_or(1800),
            rust_log,
        })
    }

    pub fn notice_dismiss(&self) -> Duration {
        Duration::from_millis(self.notice_dismiss_ms)
    }
}

/// Reads and parses an optional variable; a present but malformed value is an error.
fn optional_var<T: FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
