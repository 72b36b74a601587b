use serde::{Deserialize, Serialize};

use crate::flash::FlashLevel;

/// Kind of signed token; a flash token is never accepted as a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Flash,
}

/// Payload of the `session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // username
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub kind: TokenKind,
}

/// Payload of the `flash` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashClaims {
    pub level: FlashLevel,
    pub msg: String,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}
