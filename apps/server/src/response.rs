use actix_web::HttpResponse;
use serde::Serialize;

/// JSON body of every API response
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl Envelope<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(ErrorBody { message: message.into() }) }
    }
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::success(data))
}

pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope::success(data))
}
