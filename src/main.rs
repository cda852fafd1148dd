mod ado;
mod cli;
mod config;
mod logging;
mod model;
mod workflow;

use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use ado::http::HttpTransport;
use cli::Command;
use workflow::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_args(&args)?;
    if command == Command::Help {
        cli::print_help();
        return Ok(());
    }

    logging::init();

    let config = Arc::new(config::load_config()?);
    let transport = HttpTransport::new(Arc::clone(&config))?;
    let orchestrator = Orchestrator::new(Box::new(transport), config.project.clone());

    match cli::execute(command, &orchestrator).await {
        Ok(doc) => {
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "command failed");
            Err(err)
        }
    }
}
