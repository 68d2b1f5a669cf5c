use actix_web::web;
use uptime_service::ManagementError;

use crate::error::ApiError;

mod health;
mod integrations;
mod monitors;

/// Mount the whole API under `/api`
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()))
            .app_data(web::QueryConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()))
            .app_data(web::PathConfig::default().error_handler(|_, _| ApiError::Management(ManagementError::NotFound).into()))
            .configure(health::routes)
            .configure(monitors::routes)
            .configure(integrations::routes),
    );
}
