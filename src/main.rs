use invoice_math_rust::{api, AppConfig, MathValidator};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // local-time log lines
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    let validator = Arc::new(MathValidator::new(config.engine.clone()));
    let app = api::router(validator);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/validate              - full invoice validation");
    info!("  POST /api/validate/batch        - parallel batch validation");
    info!("  POST /api/columns/solve[/csv]   - column mapping inference");
    info!("  POST /api/lines/validate        - line formula search");
    info!("  POST /api/formats/extract       - packaging notation extraction");
    info!("  POST /api/cascade               - totals cascade");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
