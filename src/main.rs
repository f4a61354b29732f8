use std::sync::Arc;

use sparrow_dispatch::{
    handlers,
    state::{AppConfig, AppState},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt().with_max_level(config.log_level).init();

    let bind_addr = config.bind_addr;
    let app_state = AppState::new(config).await?;
    let app = handlers::app(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("sparrow-dispatch listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
