// src/lib.rs

pub mod api;
pub mod comments;
pub mod config;
pub mod error;
pub mod models;
pub mod notice;
pub mod quiz;
pub mod utils;

// Re-export specific items for convenience if needed
pub use api::{HttpBackend, LabsApi};
pub use comments::CommentManager;
pub use error::AppError;
pub use quiz::QuizEngine;
