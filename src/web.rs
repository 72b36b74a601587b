use axum::{
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::{
    auth::{gate::Forbidden, session::SessionKeys},
    flash::{Flash, IncomingFlash},
    store::StoreError,
};

/// `303 See Other` with any number of cookies attached.
pub struct SeeOther {
    to: String,
    cookies: Vec<String>,
}

impl SeeOther {
    pub fn to(uri: impl Into<String>) -> Self {
        Self {
            to: uri.into(),
            cookies: Vec::new(),
        }
    }

    pub fn set_cookie(mut self, cookie: String) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Attach a notice for the next page. A signing failure drops the
    /// notice rather than failing the redirect.
    pub fn flash(self, keys: &SessionKeys, flash: Flash) -> Self {
        match keys.sign_flash(&flash) {
            Ok(token) => {
                let cookie = keys.flash_cookie(&token);
                self.set_cookie(cookie)
            }
            Err(e) => {
                error!(error = %e, "flash signing failed");
                self
            }
        }
    }
}

impl IntoResponse for SeeOther {
    fn into_response(self) -> Response {
        let headers = AppendHeaders(self.cookies.into_iter().map(|c| (header::SET_COOKIE, c)));
        (headers, Redirect::to(&self.to)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct View<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    flash: Option<Flash>,
    #[serde(flatten)]
    body: T,
}

/// Render a page as JSON, consuming the pending flash notice.
pub fn render<T: Serialize>(
    status: StatusCode,
    keys: &SessionKeys,
    flash: IncomingFlash,
    body: T,
) -> Response {
    let IncomingFlash(flash) = flash;
    let consumed = flash.is_some();
    let page = Json(View { flash, body });
    if consumed {
        (
            status,
            [(header::SET_COOKIE, keys.clear_flash_cookie())],
            page,
        )
            .into_response()
    } else {
        (status, page).into_response()
    }
}

/// Where an anonymous caller is sent instead of seeing the page.
pub fn login_first(keys: &SessionKeys, to: &str, notice: &str) -> Response {
    SeeOther::to(to)
        .flash(keys, Flash::danger(notice))
        .into_response()
}

pub fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
}

pub fn forbidden(e: Forbidden) -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, e.to_string())
}

pub fn store_error(what: &'static str) -> impl Fn(StoreError) -> (StatusCode, String) {
    move |e| match e {
        StoreError::NotFound => (StatusCode::NOT_FOUND, format!("{what} not found")),
        other => internal(other),
    }
}
