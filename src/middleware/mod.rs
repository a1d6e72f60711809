use actix_web::{
    body::EitherBody,
    cookie::Cookie,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::{header, StatusCode},
    web, Error, FromRequest, HttpRequest, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::future::{ready, Ready as StdReady};
use url::form_urlencoded;

use crate::config::Config;
use crate::helper::api_error::ErrorBody;
use crate::helper::session_helpers::{removal_cookie, session_from_request, SessionState};
use crate::models::SessionUser;

pub const ADMIN_AREA: &str = "/admin";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

/// Extractor for admin API routes: 401 when not logged in (clearing a stale
/// cookie), 403 when logged in without the admin role.
pub struct AuthenticatedAdmin(pub SessionUser);

impl FromRequest for AuthenticatedAdmin {
    type Error = Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(current_admin(req).map(AuthenticatedAdmin))
    }
}

pub fn secure_cookies(req: &HttpRequest) -> bool {
    req.app_data::<web::Data<Config>>()
        .map_or(false, |config| config.use_secure_cookies)
}

fn json_rejection(status: StatusCode, message: &str, cookie: Option<Cookie<'static>>) -> Error {
    let mut builder = HttpResponse::build(status);
    if let Some(cookie) = cookie {
        builder.cookie(cookie);
    }
    let response = builder.json(ErrorBody {
        error: message.to_string(),
        details: None,
    });
    InternalError::from_response(message.to_string(), response).into()
}

pub fn current_admin(req: &HttpRequest) -> Result<SessionUser, Error> {
    match session_from_request(req) {
        SessionState::Valid(user) if user.is_admin() => Ok(user),
        SessionState::Valid(user) => {
            log::warn!("User '{}' with role '{}' tried an admin route", user.username, user.role);
            Err(json_rejection(StatusCode::FORBIDDEN, "Admin access required", None))
        }
        state => {
            let message = match state {
                SessionState::Expired => "Session expired",
                _ => "Not logged in",
            };
            let cookie = state.should_clear().then(|| removal_cookie(secure_cookies(req)));
            Err(json_rejection(StatusCode::UNAUTHORIZED, message, cookie))
        }
    }
}

/// True when the request carries a valid admin session. Public routes use it
/// to decide whether protected data may be shown.
pub fn is_admin_request(req: &HttpRequest) -> bool {
    session_from_request(req).user().map_or(false, SessionUser::is_admin)
}

/// Client address for visitor counting, honouring a reverse proxy's
/// `X-Forwarded-For`.
pub fn client_ip(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_admin_area(path: &str) -> bool {
    path == ADMIN_AREA || path.starts_with("/admin/")
}

fn is_login_path(path: &str) -> bool {
    path == ADMIN_LOGIN_PATH || path.starts_with("/admin/login/")
}

/// `/admin/login?message=..&redirect=<original path and query>`.
pub fn login_redirect_url(original: &str, message: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("message", message)
        .append_pair("redirect", original)
        .finish();
    format!("{}?{}", ADMIN_LOGIN_PATH, query)
}

// --- Admin page gate ---

/// Redirects requests to the admin page area to the login page unless they
/// carry a valid admin session. The login page itself is never redirected.
pub struct AdminAreaGate;

impl<S, B> Transform<S, ServiceRequest> for AdminAreaGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AdminAreaGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AdminAreaGateMiddleware { service })
    }
}

pub struct AdminAreaGateMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AdminAreaGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.path().to_string();
        if !is_admin_area(&path) || is_login_path(&path) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let state = session_from_request(req.request());
        let message = match &state {
            SessionState::Valid(user) if user.is_admin() => {
                let fut = self.service.call(req);
                return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
            }
            SessionState::Valid(_) => "Admin access required",
            SessionState::Expired => "Your session has expired. Please log in again.",
            SessionState::Invalid => "Invalid session. Please log in again.",
            SessionState::Missing => "Please log in to continue.",
        };

        let original = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or(path);
        let location = login_redirect_url(&original, message);
        log::debug!("Redirecting unauthenticated request for {} to the login page", original);

        let secure = secure_cookies(req.request());
        Box::pin(async move {
            let (http_req, _payload) = req.into_parts();
            let mut response = HttpResponse::Found();
            response.insert_header((header::LOCATION, location));
            if state.should_clear() {
                response.cookie(removal_cookie(secure));
            }
            Ok(ServiceResponse::new(http_req, response.finish().map_into_right_body()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_keeps_original_target() {
        let url = login_redirect_url("/admin/blog?tab=drafts", "Please log in to continue.");
        assert_eq!(
            url,
            "/admin/login?message=Please+log+in+to+continue.&redirect=%2Fadmin%2Fblog%3Ftab%3Ddrafts"
        );
    }

    #[test]
    fn admin_area_matching() {
        assert!(is_admin_area("/admin"));
        assert!(is_admin_area("/admin/galleries"));
        assert!(!is_admin_area("/administrator"));
        assert!(!is_admin_area("/api/admin/getBlogPost"));
        assert!(is_login_path("/admin/login"));
        assert!(is_login_path("/admin/login/reset"));
        assert!(!is_login_path("/admin/loginx"));
    }
}
