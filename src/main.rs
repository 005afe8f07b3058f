use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use cro_analyzer::{
    config::Config,
    api::routes::create_router,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cro_analyzer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing GEMINI_API_KEY stops startup here
    let config = Config::load().inspect_err(|e| tracing::error!("{}", e))?;
    let server_addr = config.server_addr;

    let app_state = AppState::new(config)?;
    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;

    tracing::info!("Starting CRO Optimizer API on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
