use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::helper::api_error::ApiError;
use crate::helper::blog_helpers::{self, published_entries};
use crate::middleware::{client_ip, is_admin_request};
use crate::AppState;

#[derive(Deserialize)]
pub struct BlogDataQuery {
    slug: Option<String>,
    id: Option<String>,
}

pub fn config_public(cfg: &mut web::ServiceConfig) {
    cfg.route("/is_server_active", web::get().to(is_server_active))
        .route("/blog-data", web::get().to(get_blog_data))
        .route("/visitor", web::get().to(get_visitor_stats))
        .route("/visitor", web::post().to(record_visit))
        .route("/register", web::post().to(register_gone));
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

/// Without a query: the index entries (published only, unless admin).
/// With `slug` or `id`: one post.
async fn get_blog_data(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<BlogDataQuery>,
) -> Result<HttpResponse, ApiError> {
    let is_admin = is_admin_request(&req);
    let key = query
        .slug
        .as_deref()
        .or(query.id.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let Some(key) = key else {
        let index = state.blog_store.load_index().await?;
        let entries = if is_admin { index.entries } else { published_entries(&index) };
        return Ok(HttpResponse::Ok().json(entries));
    };

    let post = blog_helpers::fetch_post(state.blog_store.as_ref(), key).await?;
    if post.is_draft.0 && !is_admin {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    Ok(HttpResponse::Ok().json(post))
}

async fn get_visitor_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.visitor_stats.snapshot())
}

async fn record_visit(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.visitor_stats.record(&client_ip(&req));
    HttpResponse::Ok().json(snapshot)
}

/// Self-service registration was removed; only the configured admin can log in.
async fn register_gone() -> Result<HttpResponse, ApiError> {
    Err(ApiError::Gone(
        "Registration is no longer available. Please contact the site administrator.".to_string(),
    ))
}
