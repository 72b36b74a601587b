use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::debug;

use super::gate::Identity;
use super::session::{cookie_value, SessionKeys, SESSION_COOKIE};

/// Identity carried by the signed session cookie, if any.
///
/// A missing, forged or expired cookie yields `None`; the handler decides
/// what that means through the auth gate.
pub struct CurrentSession(pub Option<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = cookie_value(&parts.headers, SESSION_COOKIE) else {
            return Ok(CurrentSession(None));
        };

        let keys = SessionKeys::from_ref(state);
        match keys.verify_session(token) {
            Ok(claims) => Ok(CurrentSession(Some(Identity::new(claims.sub)))),
            Err(e) => {
                debug!(error = %e, "ignoring invalid session cookie");
                Ok(CurrentSession(None))
            }
        }
    }
}
