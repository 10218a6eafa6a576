// CORS layer
use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for browser-based OpenAI clients
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}
