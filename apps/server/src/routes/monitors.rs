use actix_web::{HttpResponse, delete, get, post, put, web};
use serde::Deserialize;
use uptime_service::MonitorService;
use uptime_service::management::{NewTarget, TargetUpdate};
use uuid::Uuid;

use crate::auth::UserId;
use crate::error::ApiError;
use crate::response;

macros_utils::routes! {
    route create_monitor,
    route list_monitors,
    route get_monitor,
    route update_monitor,
    route delete_monitor,
    route monitor_stats,
}

const DEFAULT_STATS_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    limit: Option<usize>,
}

#[post("/monitoring-urls")]
pub async fn create_monitor(
    user: UserId,
    monitors: web::Data<MonitorService>,
    body: web::Json<NewTarget>,
) -> Result<HttpResponse, ApiError> {
    let target = monitors.create_target(user.as_str(), body.into_inner()).await?;
    Ok(response::created(target))
}

#[get("/monitoring-urls")]
pub async fn list_monitors(user: UserId, monitors: web::Data<MonitorService>) -> Result<HttpResponse, ApiError> {
    Ok(response::ok(monitors.list_targets(user.as_str()).await?))
}

#[get("/monitoring-urls/{id}")]
pub async fn get_monitor(
    user: UserId,
    monitors: web::Data<MonitorService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    Ok(response::ok(monitors.get_target(user.as_str(), *id).await?))
}

#[put("/monitoring-urls/{id}")]
pub async fn update_monitor(
    user: UserId,
    monitors: web::Data<MonitorService>,
    id: web::Path<Uuid>,
    body: web::Json<TargetUpdate>,
) -> Result<HttpResponse, ApiError> {
    let target = monitors.update_target(user.as_str(), *id, body.into_inner()).await?;
    Ok(response::ok(target))
}

#[delete("/monitoring-urls/{id}")]
pub async fn delete_monitor(
    user: UserId,
    monitors: web::Data<MonitorService>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    monitors.delete_target(user.as_str(), *id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Newest-first probe history for the dashboard
#[get("/monitoring-urls/{id}/stats")]
pub async fn monitor_stats(
    user: UserId,
    monitors: web::Data<MonitorService>,
    id: web::Path<Uuid>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_STATS_LIMIT);
    Ok(response::ok(monitors.recent_results(user.as_str(), *id, limit).await?))
}
