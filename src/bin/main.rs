use std::io::{self, BufRead, Write};
use stock_research_agent::agent::create_default_orchestrator;
use stock_research_agent::models::TurnOutcome;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    dotenv::dotenv().ok();

    let orchestrator = create_default_orchestrator()?;
    let session_id = Uuid::new_v4();

    info!(session_id = %session_id, "Stock Research Agent starting");
    println!("Ask me about any public company or compare two (e.g. `Compare Apple and Microsoft`).");
    println!("Empty line to quit.\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            break;
        }

        match orchestrator.handle_turn(session_id, query).await {
            Ok(TurnOutcome::Narrative(narrative)) => {
                println!("\n{}\n", narrative);
            }
            Ok(TurnOutcome::Clarification(message)) => {
                println!("\n{}\n", message);
            }
            Err(e) => {
                eprintln!("\nAnalysis unavailable, please try again. ({})\n", e);
            }
        }
    }

    Ok(())
}
