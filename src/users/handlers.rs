use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::CurrentSession,
        gate::{require_authenticated, require_owner},
        session::SessionKeys,
    },
    flash::{Flash, IncomingFlash},
    state::AppState,
    users::dto::UserPage,
    web::{forbidden, internal, login_first, render, store_error, SeeOther},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:username", get(show_user))
        .route("/users/:username/delete", post(delete_user))
}

#[instrument(skip(state, session, flash))]
pub async fn show_user(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    flash: IncomingFlash,
    Path(username): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/register", "Please login/register first"));
    };

    let user = state
        .store
        .find_user(&username)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;
    require_owner(&identity, &user.username).map_err(|e| {
        warn!(caller = %identity, "viewing another user's page");
        forbidden(e)
    })?;

    let feedback = state
        .store
        .list_feedback_by_owner(&user.username)
        .await
        .map_err(internal)?;

    Ok(render(StatusCode::OK, &keys, flash, UserPage { user, feedback }))
}

/// Delete the account and all of its feedback, then end the session.
#[instrument(skip(state, session))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(username): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/login", "You cannot delete this user. Please login first!"));
    };

    let user = state
        .store
        .find_user(&username)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;
    require_owner(&identity, &user.username).map_err(|e| {
        warn!(caller = %identity, "deleting another user");
        forbidden(e)
    })?;

    let removed = state
        .store
        .delete_user(&user.username)
        .await
        .map_err(store_error("User"))?;
    info!(%username, removed, "user deleted");

    Ok(SeeOther::to("/")
        .set_cookie(keys.clear_session_cookie())
        .flash(&keys, Flash::success(format!("Deleted user {username}")))
        .into_response())
}
