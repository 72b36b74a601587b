use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, RegisterForm},
        services::{authenticate, register, RegisterError},
        session::SessionKeys,
    },
    flash::{Flash, IncomingFlash},
    forms::{FieldErrors, FormView},
    state::AppState,
    web::{internal, render, SeeOther},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/register", get(register_form).post(register_user))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
}

pub async fn root() -> SeeOther {
    SeeOther::to("/register")
}

pub async fn register_form(State(state): State<AppState>, flash: IncomingFlash) -> Response {
    let keys = SessionKeys::from_ref(&state);
    render(StatusCode::OK, &keys, flash, FormView::empty("register"))
}

/// Log `username` in and send them to their page.
fn start_session(
    keys: &SessionKeys,
    username: &str,
    flash: Option<Flash>,
) -> Result<SeeOther, (StatusCode, String)> {
    let token = keys.sign_session(username).map_err(internal)?;
    let redirect = SeeOther::to(format!("/users/{username}")).set_cookie(keys.session_cookie(&token));
    Ok(match flash {
        Some(flash) => redirect.flash(keys, flash),
        None => redirect,
    })
}

#[instrument(skip(state, flash, form))]
pub async fn register_user(
    State(state): State<AppState>,
    flash: IncomingFlash,
    Form(form): Form<RegisterForm>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    let form = form.normalized();

    let errors = form.validate();
    if !errors.is_empty() {
        warn!(username = %form.username, "registration form invalid");
        return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, &keys, flash, form.view(errors)));
    }

    let user = match register(state.store.as_ref(), &state.hasher, &form).await {
        Ok(u) => u,
        Err(RegisterError::DuplicateUsername) => {
            warn!(username = %form.username, "username already taken");
            let mut errors = FieldErrors::new();
            errors.add("username", "Username taken. Please pick another");
            return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, &keys, flash, form.view(errors)));
        }
        Err(RegisterError::DuplicateEmail) => {
            warn!(username = %form.username, "email already registered");
            let mut errors = FieldErrors::new();
            errors.add("email", "Email already registered");
            return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, &keys, flash, form.view(errors)));
        }
        Err(RegisterError::Other(e)) => return Err(internal(e)),
    };

    info!(username = %user.username, "user registered");
    Ok(start_session(&keys, &user.username, None)?.into_response())
}

pub async fn login_form(State(state): State<AppState>, flash: IncomingFlash) -> Response {
    let keys = SessionKeys::from_ref(&state);
    render(StatusCode::OK, &keys, flash, FormView::empty("login"))
}

#[instrument(skip(state, flash, form))]
pub async fn login(
    State(state): State<AppState>,
    flash: IncomingFlash,
    Form(mut form): Form<LoginForm>,
) -> Result<Response, (StatusCode, String)> {
    let keys = SessionKeys::from_ref(&state);
    form.username = form.username.trim().to_string();

    let errors = form.validate();
    if !errors.is_empty() {
        return Ok(render(StatusCode::UNPROCESSABLE_ENTITY, &keys, flash, form.view(errors)));
    }

    let user = authenticate(
        state.store.as_ref(),
        &state.hasher,
        &form.username,
        &form.password,
    )
    .await
    .map_err(internal)?;

    let Some(user) = user else {
        warn!(username = %form.username, "login rejected");
        let mut errors = FieldErrors::new();
        errors.add("username", "Invalid username/password");
        return Ok(render(StatusCode::UNAUTHORIZED, &keys, flash, form.view(errors)));
    };

    info!(username = %user.username, "user logged in");
    let welcome = Flash::info(format!("Welcome back, {}!", user.username));
    Ok(start_session(&keys, &user.username, Some(welcome))?.into_response())
}

/// Clearing an absent session is not an error.
pub async fn logout(State(state): State<AppState>) -> SeeOther {
    let keys = SessionKeys::from_ref(&state);
    SeeOther::to("/")
        .set_cookie(keys.clear_session_cookie())
        .flash(&keys, Flash::info("Goodbye"))
}
