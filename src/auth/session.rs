use std::time::Duration;

use axum::extract::FromRef;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, FlashClaims, TokenKind};
use crate::{config::SessionConfig, flash::Flash, state::AppState};

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";

const FLASH_TTL: Duration = Duration::from_secs(5 * 60);

/// Signing material for the session and flash cookies.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub cookie_secure: bool,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        SessionKeys::from_config(&state.config.session)
    }
}

impl SessionKeys {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            cookie_secure: cfg.cookie_secure,
        }
    }

    fn expiry(&self, ttl: Duration) -> (usize, usize) {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    fn sign<T: Serialize>(&self, claims: &T) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> anyhow::Result<T> {
        Ok(decode::<T>(token, &self.decoding, &self.validation())?.claims)
    }

    pub fn sign_session(&self, username: &str) -> anyhow::Result<String> {
        let (iat, exp) = self.expiry(self.ttl);
        let token = self.sign(&Claims {
            sub: username.to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Session,
        })?;
        debug!(%username, "session signed");
        Ok(token)
    }

    pub fn verify_session(&self, token: &str) -> anyhow::Result<Claims> {
        let claims: Claims = self.verify(token)?;
        if claims.kind != TokenKind::Session {
            anyhow::bail!("not a session token");
        }
        Ok(claims)
    }

    pub fn sign_flash(&self, flash: &Flash) -> anyhow::Result<String> {
        let (_, exp) = self.expiry(FLASH_TTL);
        self.sign(&FlashClaims {
            level: flash.level,
            msg: flash.message.clone(),
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Flash,
        })
    }

    pub fn verify_flash(&self, token: &str) -> anyhow::Result<Flash> {
        let claims: FlashClaims = self.verify(token)?;
        if claims.kind != TokenKind::Flash {
            anyhow::bail!("not a flash token");
        }
        Ok(Flash {
            level: claims.level,
            message: claims.msg,
        })
    }

    pub fn session_cookie(&self, token: &str) -> String {
        set_cookie(SESSION_COOKIE, token, self.ttl.as_secs(), self.cookie_secure)
    }

    pub fn clear_session_cookie(&self) -> String {
        set_cookie(SESSION_COOKIE, "", 0, self.cookie_secure)
    }

    pub fn flash_cookie(&self, token: &str) -> String {
        set_cookie(FLASH_COOKIE, token, FLASH_TTL.as_secs(), self.cookie_secure)
    }

    pub fn clear_flash_cookie(&self) -> String {
        set_cookie(FLASH_COOKIE, "", 0, self.cookie_secure)
    }
}

fn set_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of the named cookie across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v)
}
