// src/models/mod.rs

pub mod comment;
pub mod question;
pub mod user;
