use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::helper::api_error::ApiError;
use crate::helper::blog_helpers::{self, CreatePostRequest, DeletePostRequest, UpdatePostRequest};
use crate::middleware::AuthenticatedAdmin;
use crate::models::db_operations::blog_file_operations;
use crate::AppState;

#[derive(Deserialize)]
pub struct GetPostQuery {
    id: Option<String>,
    slug: Option<String>,
}

pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/blog-data", web::post().to(update_blog_post))
        .service(
            web::scope("/admin")
                .route("/createBlogPost", web::post().to(create_blog_post))
                .route("/deleteBlogPost", web::post().to(delete_blog_post))
                .route("/getBlogPost", web::get().to(get_blog_post))
                .route("/checkBlogIndex", web::get().to(check_blog_index))
                .route("/cleanupBlogIndex", web::post().to(cleanup_blog_index))
                .route("/repairBlogIndex", web::post().to(repair_blog_index)),
        );
}

async fn create_blog_post(
    admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let post = blog_helpers::create_post(state.blog_store.as_ref(), body.into_inner(), &admin.0.username).await?;
    log::info!(
        "Admin '{}' created post '{}' ({} store)",
        admin.0.username,
        post.slug,
        state.blog_store.backend_name()
    );
    Ok(HttpResponse::Created().json(json!({ "success": true, "post": post })))
}

async fn update_blog_post(
    admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    body: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let post = blog_helpers::update_post(state.blog_store.as_ref(), body.into_inner()).await?;
    log::info!("Admin '{}' updated post '{}'", admin.0.username, post.slug);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post })))
}

async fn delete_blog_post(
    admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    body: web::Json<DeletePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let slug = blog_helpers::delete_post(state.blog_store.as_ref(), body.into_inner()).await?;
    log::info!("Admin '{}' deleted post '{}'", admin.0.username, slug);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "slug": slug })))
}

async fn get_blog_post(
    _admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    query: web::Query<GetPostQuery>,
) -> Result<HttpResponse, ApiError> {
    let key = query
        .id
        .as_deref()
        .or(query.slug.as_deref())
        .ok_or_else(|| ApiError::BadRequest("id is required".to_string()))?;
    let post = blog_helpers::fetch_post(state.blog_store.as_ref(), key).await?;
    Ok(HttpResponse::Ok().json(post))
}

// Index maintenance always works on the local blog directory.

async fn check_blog_index(_admin: AuthenticatedAdmin, config: web::Data<Config>) -> Result<HttpResponse, ApiError> {
    let dir = config.blog_dir();
    let report = web::block(move || blog_file_operations::check_index(&dir)).await?;
    Ok(HttpResponse::Ok().json(report))
}

async fn cleanup_blog_index(admin: AuthenticatedAdmin, config: web::Data<Config>) -> Result<HttpResponse, ApiError> {
    let dir = config.blog_dir();
    let report = web::block(move || blog_file_operations::cleanup_index(&dir)).await??;
    log::info!(
        "Admin '{}' cleaned the blog index: {} duplicate(s) removed",
        admin.0.username,
        report.removed_count
    );
    Ok(HttpResponse::Ok().json(json!({ "success": true, "report": report })))
}

async fn repair_blog_index(admin: AuthenticatedAdmin, config: web::Data<Config>) -> Result<HttpResponse, ApiError> {
    let dir = config.blog_dir();
    let report = web::block(move || blog_file_operations::repair_index(&dir)).await??;
    log::info!(
        "Admin '{}' repaired the blog index: {} added, {} removed",
        admin.0.username,
        report.added_slugs.len(),
        report.removed_slugs.len()
    );
    Ok(HttpResponse::Ok().json(json!({ "success": true, "report": report })))
}
