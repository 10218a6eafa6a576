// proxy module - session & proxy pool gateway

pub mod config;
pub mod dispatcher;
pub mod health;
pub mod rotator;
pub mod server;
pub mod session_pool;
pub mod sticky;

pub mod common;
pub mod handlers; // API endpoint handlers
pub mod middleware; // Axum middleware
pub mod upstream; // Upstream client

pub use config::ProxyConfig;
pub use dispatcher::Dispatcher;
pub use server::{build_router, AppState, AxumServer};
pub use session_pool::{Session, SessionPool};
