// src/models/user.rs

use serde::{Deserialize, Serialize};

/// The signed-in user as seen by this client.
/// Used to stamp optimistic comments and for client-side ownership checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,

    pub username: String,

    pub avatar_url: Option<String>,

    /// User role: 'learner', 'author' or 'admin'.
    pub role: String,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
