use actix_web::web;

use crate::helper::api_error::ApiError;

pub mod admin;
pub mod auth;
pub mod gallery;
pub mod public;

/// Every JSON route lives under one `/api` scope. Body and query parse
/// failures answer with the same `{error}` payload as handler errors.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid query: {}", err)).into());

    cfg.service(
        web::scope("/api")
            .app_data(json_config)
            .app_data(query_config)
            .configure(public::config_public)
            .configure(auth::config_auth)
            .configure(gallery::config_gallery)
            .configure(admin::config_admin),
    );
}
