//! Small declarative helpers shared by the HTTP apps.

#[cfg(feature = "actix")]
#[doc(hidden)]
pub use actix_web;

/// Generate a `routes` function registering the listed actix handlers.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route list_monitors,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::actix_web::web::ServiceConfig) {
            $(cfg.service($handler);)*
        }
    };
}
