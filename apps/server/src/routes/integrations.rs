use actix_web::{HttpResponse, delete, get, post, web};
use uptime_service::MonitorService;
use uptime_service::management::NewIntegration;
use uuid::Uuid;

use crate::auth::UserId;
use crate::error::ApiError;
use crate::response;

macros_utils::routes! {
    route add_integration,
    route list_integrations,
    route get_integration,
    route delete_integration,
}

#[post("/integrations")]
pub async fn add_integration(
    user: UserId,
    monitors: web::Data<MonitorService>,
    body: web::Json<NewIntegration>,
) -> Result<HttpResponse, ApiError> {
    let integration = monitors.add_integration(user.as_str(), body.into_inner()).await?;
    Ok(response::created(integration))
}

#[get("/integrations")]
pub async fn list_integrations(user: UserId, monitors: web::Data<MonitorService>) -> Result<HttpResponse, ApiError> {
    Ok(response::ok(monitors.list_integrations(user.as_str()).await?))
}

#[get("/integrations/{id}")]
pub async fn get_integration(
    user: UserId,
    monitors: web::Data<MonitorService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    Ok(response::ok(monitors.get_integration(user.as_str(), *id).await?))
}

#[delete("/integrations/{id}")]
pub async fn delete_integration(
    user: UserId,
    monitors: web::Data<MonitorService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    monitors.delete_integration(user.as_str(), *id).await?;
    Ok(HttpResponse::NoContent().finish())
}
