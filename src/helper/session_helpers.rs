use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value;

use crate::config::AdminCredentials;
use crate::helper::form_helpers::lenient_id;
use crate::models::SessionUser;

pub const SESSION_COOKIE: &str = "tubox_session";
pub const SESSION_LIFETIME_MS: i64 = 24 * 60 * 60 * 1000;

/// Outcome of looking at the session cookie of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Missing,
    Invalid,
    Expired,
    Valid(SessionUser),
}

impl SessionState {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::Valid(user) => Some(user),
            _ => None,
        }
    }

    /// A cookie that is present but unusable gets cleared on the response.
    pub fn should_clear(&self) -> bool {
        matches!(self, SessionState::Invalid | SessionState::Expired)
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn required_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Percent-decodes and parses the cookie value. Any failure, including a
/// missing timestamp, yields `None`.
pub fn decode_session(raw: &str) -> Option<SessionUser> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let value: Value = serde_json::from_str(&decoded).ok()?;
    Some(SessionUser {
        username: required_str(&value, "username")?,
        email: required_str(&value, "email")?,
        role: required_str(&value, "role")?,
        session_id: value
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp: value.get("timestamp").and_then(lenient_id)?,
    })
}

pub fn evaluate_session(raw: Option<&str>, now: i64) -> SessionState {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return SessionState::Missing;
    };
    match decode_session(raw) {
        None => SessionState::Invalid,
        Some(user) if now - user.timestamp > SESSION_LIFETIME_MS => SessionState::Expired,
        Some(user) => SessionState::Valid(user),
    }
}

pub fn session_from_request(req: &HttpRequest) -> SessionState {
    let cookie = req.cookie(SESSION_COOKIE);
    evaluate_session(cookie.as_ref().map(|c| c.value()), now_ms())
}

pub fn encode_session(user: &SessionUser) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(user)?;
    Ok(utf8_percent_encode(&json, NON_ALPHANUMERIC).to_string())
}

/// Client-readable session cookie (the frontend reads the user from it).
pub fn session_cookie(user: &SessionUser, secure: bool) -> Result<Cookie<'static>, serde_json::Error> {
    Ok(Cookie::build(SESSION_COOKIE, encode_session(user)?)
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(Duration::milliseconds(SESSION_LIFETIME_MS))
        .http_only(false)
        .secure(secure)
        .finish())
}

pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .finish();
    cookie.make_removal();
    cookie
}

pub fn new_admin_session(admin: &AdminCredentials) -> SessionUser {
    let username = admin.username.clone().unwrap_or_else(|| "admin".to_string());
    let email = admin
        .email
        .clone()
        .unwrap_or_else(|| format!("{}@localhost", username));
    SessionUser {
        username,
        email,
        role: "admin".to_string(),
        session_id: uuid::Uuid::new_v4().to_string(),
        timestamp: now_ms(),
    }
}

/// Identifier is the admin username or email (email case-insensitive). The
/// password is checked against the bcrypt hash when one is configured,
/// otherwise against the plain password.
pub fn verify_admin_credentials(admin: &AdminCredentials, identifier: &str, password: &str) -> bool {
    let identifier = identifier.trim();
    let name_matches = admin.username.as_deref() == Some(identifier);
    let email_matches = admin
        .email
        .as_deref()
        .map_or(false, |email| email.eq_ignore_ascii_case(identifier));
    if identifier.is_empty() || !(name_matches || email_matches) {
        return false;
    }
    match (&admin.password_hash, &admin.password) {
        (Some(hash), _) => bcrypt::verify(password, hash).unwrap_or_else(|e| {
            log::error!("ADMIN_PASSWORD_HASH could not be verified: {}", e);
            false
        }),
        (None, Some(plain)) => plain == password,
        (None, None) => false,
    }
}
