#[tokio::main]
async fn main() {
    if let Err(e) = session_gateway_lib::run().await {
        tracing::error!("Gateway failed to start: {:#}", e);
        eprintln!("Gateway failed to start: {:#}", e);
        std::process::exit(1);
    }
}
