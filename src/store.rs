use async_trait::async_trait;

use crate::feedback::repo_types::{Feedback, NewFeedback};
use crate::users::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for users and their feedback.
///
/// Every write is atomic: a failed call leaves the store unchanged.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a user. Fails with `DuplicateUsername` / `DuplicateEmail`
    /// instead of overwriting an existing row.
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Delete a user together with all of their feedback.
    /// Returns the number of feedback rows removed.
    async fn delete_user(&self, username: &str) -> Result<u64, StoreError>;

    async fn create_feedback(&self, new: NewFeedback) -> Result<Feedback, StoreError>;
    async fn get_feedback(&self, id: i32) -> Result<Feedback, StoreError>;
    async fn update_feedback(&self, id: i32, title: &str, content: &str)
        -> Result<Feedback, StoreError>;
    async fn delete_feedback(&self, id: i32) -> Result<Feedback, StoreError>;
    async fn list_feedback_by_owner(&self, username: &str) -> Result<Vec<Feedback>, StoreError>;
}

#[cfg(test)]
pub use memory::MemoryStore;
