use std::sync::Arc;
use stock_research_agent::{agent::create_default_orchestrator, api::start_server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    if std::env::var("GEMINI_API_KEY").is_err() {
        eprintln!("GEMINI_API_KEY not set in .env; classification and narratives will fail");
    }

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Stock Research Agent - API Server");
    info!("Port: {}", api_port);

    let orchestrator = Arc::new(create_default_orchestrator()?);

    info!("Orchestrator initialized");
    info!("Starting API server...");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
