use serde::Serialize;

use crate::feedback::repo_types::Feedback;
use crate::users::repo_types::User;

/// A user's own page: profile and all of their feedback.
#[derive(Debug, Serialize)]
pub struct UserPage {
    pub user: User,
    pub feedback: Vec<Feedback>,
}
