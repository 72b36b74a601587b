use std::sync::Arc;

use anyhow::Context;

use crate::auth::dto::RegisterForm;
use crate::auth::password::{dummy_hash, CredentialHasher};
use crate::store::{Store, StoreError};
use crate::users::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Hash the password and insert the user. Duplicate keys are reported as
/// such; the existing user is never touched.
pub async fn register(
    store: &dyn Store,
    hasher: &Arc<dyn CredentialHasher>,
    form: &RegisterForm,
) -> Result<User, RegisterError> {
    let hasher = Arc::clone(hasher);
    let plain = form.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
        .await
        .context("hash task")??;
    let new = NewUser {
        username: form.username.clone(),
        password_hash,
        email: form.email.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
    };
    match store.insert_user(new).await {
        Ok(user) => Ok(user),
        Err(StoreError::DuplicateUsername) => Err(RegisterError::DuplicateUsername),
        Err(StoreError::DuplicateEmail) => Err(RegisterError::DuplicateEmail),
        Err(e) => Err(RegisterError::Other(e.into())),
    }
}

/// The user, if the username exists and the password matches. Unknown
/// username and wrong password both give `None`, and both pay for one
/// hash verification.
pub async fn authenticate(
    store: &dyn Store,
    hasher: &Arc<dyn CredentialHasher>,
    username: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    let user = store.find_user(username).await?;
    let stored = match &user {
        Some(u) => u.password_hash.clone(),
        None => dummy_hash().to_string(),
    };

    let hasher = Arc::clone(hasher);
    let plain = password.to_string();
    let matched = tokio::task::spawn_blocking(move || hasher.verify(&plain, &stored))
        .await
        .context("verify task")??;

    Ok(user.filter(|_| matched))
}
