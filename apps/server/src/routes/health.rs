use actix_web::{HttpResponse, get};
use serde::Serialize;

use crate::response;

macros_utils::routes! {
    route health_route,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// Liveness check, answers as long as the HTTP server is up
#[get("/")]
pub async fn health_route() -> HttpResponse {
    response::ok(Health { status: "ok", version: env!("CARGO_PKG_VERSION") })
}
