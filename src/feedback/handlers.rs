use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::CurrentSession,
        gate::{require_authenticated, require_owner, Identity},
        session::SessionKeys,
    },
    feedback::{
        dto::FeedbackForm,
        repo_types::{Feedback, NewFeedback},
    },
    flash::IncomingFlash,
    forms::FormView,
    state::AppState,
    web::{forbidden, internal, login_first, render, store_error, SeeOther},
};

const ADD_FORM: &str = "feedback_add";
const EDIT_FORM: &str = "feedback_edit";

pub fn feedback_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:username/feedback/add",
            get(add_feedback_form).post(add_feedback),
        )
        .route(
            "/feedback/:id/update",
            get(edit_feedback_form).post(update_feedback),
        )
        .route("/feedback/:id/delete", post(delete_feedback))
}

/// The page owner must exist and be the caller.
async fn owned_user(
    state: &AppState,
    identity: &Identity,
    username: &str,
) -> Result<(), (StatusCode, String)> {
    state
        .store
        .find_user(username)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;
    require_owner(identity, username).map_err(|e| {
        warn!(caller = %identity, owner = %username, "feedback for another user");
        forbidden(e)
    })
}

/// The feedback must exist and belong to the caller.
async fn owned_feedback(
    state: &AppState,
    identity: &Identity,
    id: i32,
) -> Result<Feedback, (StatusCode, String)> {
    let feedback = state
        .store
        .get_feedback(id)
        .await
        .map_err(store_error("Feedback"))?;
    require_owner(identity, &feedback.username).map_err(|e| {
        warn!(caller = %identity, owner = %feedback.username, id, "feedback owned by another user");
        forbidden(e)
    })?;
    Ok(feedback)
}

#[instrument(skip(state, session, flash))]
pub async fn add_feedback_form(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    flash: IncomingFlash,
    Path(username): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/login", "Please login before adding feedback!"));
    };
    owned_user(&state, &identity, &username).await?;
    Ok(render(StatusCode::OK, &keys, flash, FormView::empty(ADD_FORM)))
}

#[instrument(skip(state, session, flash, form))]
pub async fn add_feedback(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    flash: IncomingFlash,
    Path(username): Path<String>,
    Form(form): Form<FeedbackForm>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/login", "Please login before adding feedback!"));
    };
    owned_user(&state, &identity, &username).await?;

    let errors = form.validate();
    if !errors.is_empty() {
        return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, &keys, flash, form.view(ADD_FORM, errors)));
    }

    let feedback = state
        .store
        .create_feedback(NewFeedback {
            title: form.title,
            content: form.content,
            username: identity.username().to_string(),
        })
        .await
        .map_err(store_error("User"))?;
    info!(id = feedback.id, owner = %feedback.username, "feedback created");

    Ok(SeeOther::to(format!("/users/{}", feedback.username)).into_response())
}

#[instrument(skip(state, session, flash))]
pub async fn edit_feedback_form(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    flash: IncomingFlash,
    Path(id): Path<i32>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/login", "Please login before editing feedback!"));
    };
    let feedback = owned_feedback(&state, &identity, id).await?;

    let view = FormView::empty(EDIT_FORM)
        .value("title", feedback.title)
        .value("content", feedback.content);
    Ok(render(StatusCode::OK, &keys, flash, view))
}

#[instrument(skip(state, session, flash, form))]
pub async fn update_feedback(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    flash: IncomingFlash,
    Path(id): Path<i32>,
    Form(form): Form<FeedbackForm>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/login", "Please login before editing feedback!"));
    };
    owned_feedback(&state, &identity, id).await?;

    let errors = form.validate();
    if !errors.is_empty() {
        return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, &keys, flash, form.view(EDIT_FORM, errors)));
    }

    let feedback = state
        .store
        .update_feedback(id, &form.title, &form.content)
        .await
        .map_err(store_error("Feedback"))?;
    info!(id, owner = %feedback.username, "feedback updated");

    Ok(SeeOther::to(format!("/users/{}", feedback.username)).into_response())
}

#[instrument(skip(state, session))]
pub async fn delete_feedback(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<i32>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let Ok(identity) = require_authenticated(session) else {
        return Ok(login_first(&keys, "/login", "Please login before deleting feedback!"));
    };
    owned_feedback(&state, &identity, id).await?;

    let feedback = state
        .store
        .delete_feedback(id)
        .await
        .map_err(store_error("Feedback"))?;
    info!(id, owner = %feedback.username, "feedback deleted");

    Ok(SeeOther::to(format!("/users/{}", feedback.username)).into_response())
}
