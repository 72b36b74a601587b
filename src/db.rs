use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use crate::config::AppConfig;
use crate::feedback::repo_types::{Feedback, NewFeedback};
use crate::store::{Store, StoreError};
use crate::users::repo_types::{NewUser, User};

// Named explicitly in migrations/20240101000000_users_feedback.sql.
const USERNAME_PKEY: &str = "users_pkey";
const EMAIL_KEY: &str = "users_email_key";

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Translate constraint violations into store errors; everything else
/// stays a plain database error.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(EMAIL_KEY) => return StoreError::DuplicateEmail,
                Some(USERNAME_PKEY) => return StoreError::DuplicateUsername,
                _ => {}
            }
        } else if db_err.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    if matches!(e, sqlx::Error::RowNotFound) {
        return StoreError::NotFound;
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, email, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING username, password_hash, email, first_name, last_name, created_at
            "#,
        )
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT username, password_hash, email, first_name, last_name, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete_user(&self, username: &str) -> Result<u64, StoreError> {
        let mut tx = self.db.begin().await?;

        // The FK cascades too; deleting children first keeps the count.
        let removed = sqlx::query("DELETE FROM feedback WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        }
        tx.commit().await?;
        debug!(%username, removed, "user deleted");
        Ok(removed)
    }

    async fn create_feedback(&self, new: NewFeedback) -> Result<Feedback, StoreError> {
        sqlx::query_as::<_, Feedback>(
            r#"
            INSERT INTO feedback (title, content, username)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, username, created_at
            "#,
        )
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.username)
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)
    }

    async fn get_feedback(&self, id: i32) -> Result<Feedback, StoreError> {
        sqlx::query_as::<_, Feedback>(
            r#"
            SELECT id, title, content, username, created_at
            FROM feedback
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)
    }

    async fn update_feedback(
        &self,
        id: i32,
        title: &str,
        content: &str,
    ) -> Result<Feedback, StoreError> {
        sqlx::query_as::<_, Feedback>(
            r#"
            UPDATE feedback
               SET title = $2, content = $3
             WHERE id = $1
            RETURNING id, title, content, username, created_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)
    }

    async fn delete_feedback(&self, id: i32) -> Result<Feedback, StoreError> {
        sqlx::query_as::<_, Feedback>(
            r#"
            DELETE FROM feedback
             WHERE id = $1
            RETURNING id, title, content, username, created_at
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)
    }

    async fn list_feedback_by_owner(&self, username: &str) -> Result<Vec<Feedback>, StoreError> {
        let rows = sqlx::query_as::<_, Feedback>(
            r#"
            SELECT id, title, content, username, created_at
            FROM feedback
            WHERE username = $1
            ORDER BY id ASC
            "#,
        )
        .bind(username)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
