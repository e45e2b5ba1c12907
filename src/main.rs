use std::sync::Arc;

use clap::Parser;

use wayfarer::config::Config;
use wayfarer::error::Result;
use wayfarer::providers::{storage_from_config, OpenAiProvider};
use wayfarer::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "wayfarerd")]
#[command(about = "Wayfarer travel planner server")]
struct Cli {
    #[arg(long, env = "WAYFARER_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "WAYFARER_PORT", default_value_t = 5000)]
    port: u16,

    #[arg(long, env = "WAYFARER_DB", default_value_t = wayfarer::runtime_paths::default_db_path())]
    db: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    wayfarer::logging::init_tracing("wayfarerd");
    let cli = Cli::parse();

    let config = Config::from_env();
    let storage = storage_from_config(&config, &cli.db).await?;
    let llm = Arc::new(OpenAiProvider::new(
        config.ai.api_key.clone(),
        config.ai.model.clone(),
        config.ai.base_url.clone(),
    ));

    let state = AppState::new(&config, storage, llm);
    server::run(&cli.host, cli.port, state).await
}
