use actix_web::{http::header, web, HttpMessage, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::helper::api_error::{ApiError, ErrorBody};
use crate::helper::form_helpers::parse_form;
use crate::helper::session_helpers::{
    new_admin_session, removal_cookie, session_cookie, session_from_request, verify_admin_credentials,
    SessionState,
};

#[derive(Deserialize, Default)]
struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    identifier: Option<String>,
    password: Option<String>,
}

impl LoginRequest {
    fn identifier(&self) -> Option<&str> {
        [&self.identifier, &self.username, &self.email]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

pub fn config_auth(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/auth/me", web::get().to(current_user));
}

/// Accepts JSON or a urlencoded form.
fn parse_login(req: &HttpRequest, body: &web::Bytes) -> Result<LoginRequest, ApiError> {
    if req.content_type() == "application/x-www-form-urlencoded" {
        let mut form = parse_form(body)?;
        return Ok(LoginRequest {
            username: form.remove("username"),
            email: form.remove("email"),
            identifier: form.remove("identifier"),
            password: form.remove("password"),
        });
    }
    if body.is_empty() {
        return Ok(LoginRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

async fn login(req: HttpRequest, body: web::Bytes, config: web::Data<Config>) -> Result<HttpResponse, ApiError> {
    let login = parse_login(&req, &body)?;
    let (Some(identifier), Some(password)) = (login.identifier(), login.password.as_deref().filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::BadRequest("Username/email and password are required".to_string()));
    };

    if !verify_admin_credentials(&config.admin, identifier, password) {
        log::warn!("Failed admin login attempt for '{}'", identifier);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let user = new_admin_session(&config.admin);
    let cookie = session_cookie(&user, config.use_secure_cookies)
        .map_err(|e| ApiError::Internal(format!("Could not encode session: {}", e)))?;
    log::info!("Admin '{}' logged in", user.username);
    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "success": true, "user": user })))
}

async fn logout(config: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(removal_cookie(config.use_secure_cookies))
        .json(json!({ "success": true }))
}

async fn current_user(req: HttpRequest, config: web::Data<Config>) -> HttpResponse {
    let state = session_from_request(&req);
    if let SessionState::Valid(user) = state {
        return HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(json!({ "authenticated": true, "user": user }));
    }
    let mut response = HttpResponse::Unauthorized();
    if state.should_clear() {
        response.cookie(removal_cookie(config.use_secure_cookies));
    }
    response.json(ErrorBody {
        error: if state == SessionState::Expired { "Session expired" } else { "Not logged in" }.to_string(),
        details: None,
    })
}
