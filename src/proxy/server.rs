use crate::proxy::dispatcher::Dispatcher;
use crate::proxy::middleware::AccessGate;
use crate::proxy::upstream::UpstreamClient;
use crate::proxy::{ProxyConfig, SessionPool};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub upstream: Arc<UpstreamClient>,
    pub access_gate: AccessGate,
}

impl AppState {
    pub fn new(config: &ProxyConfig, pool: Arc<SessionPool>) -> Result<Self, String> {
        let upstream = UpstreamClient::new(&config.upstream, config.request_timeout)
            .map_err(|e| e.to_string())?;
        Ok(Self {
            dispatcher: Dispatcher::new(pool),
            upstream: Arc::new(upstream),
            access_gate: AccessGate::from_config(config),
        })
    }
}

/// Build the route table
pub fn build_router(state: AppState, mirror_prefix: Option<&str>) -> Router {
    use crate::proxy::handlers;

    let mut app = Router::new()
        .route("/health", get(health_check_handler))
        // OpenAI Protocol
        .route(
            "/v1/chat/completions",
            post(handlers::openai::handle_chat_completions),
        )
        .route("/v1/models", get(handlers::openai::handle_list_models))
        // HuggingFace compatible routes
        .route(
            "/hf/v1/chat/completions",
            post(handlers::openai::handle_chat_completions),
        )
        .route("/hf/v1/models", get(handlers::openai::handle_list_models));

    if let Some(prefix) = mirror_prefix {
        app = app
            .route(
                &format!("{}/v1/chat/completions", prefix),
                post(handlers::openai::handle_mirror_chat_completions),
            )
            .route(
                &format!("{}/v1/models", prefix),
                get(handlers::openai::handle_list_models),
            );
    }

    app.layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::proxy::middleware::auth_middleware,
        ))
        .layer(crate::proxy::middleware::cors_layer())
        .with_state(state)
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AxumServer {
    /// Start Axum server
    pub async fn start(
        config: &ProxyConfig,
        pool: Arc<SessionPool>,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let state = AppState::new(config, pool)?;
        let app = build_router(state, config.mirror_prefix());

        // Bind address
        let addr = config.address.as_str();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| format!("Failed to bind address {}: {}", addr, e))?;

        tracing::info!("Gateway server started at http://{}", addr);

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_instance = Self {
            shutdown_tx: Some(shutdown_tx),
        };

        // Start server in new task
        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection handling finished or errored: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Gateway server stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((server_instance, handle))
    }

    /// Stop server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Health check handler
async fn health_check_handler(State(state): State<AppState>) -> Response {
    let pool = state.dispatcher.pool();
    Json(serde_json::json!({
        "status": "ok",
        "sessions": pool.len(),
        "proxies": pool.proxies().len(),
        "retryBudget": pool.retry_budget(),
    }))
    .into_response()
}
