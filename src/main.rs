mod chain;
mod config;
mod error;
mod image;
mod llm;
mod pipeline;
mod planner;
mod prompts;
mod result;
mod server;
mod translator;

use anyhow::Result;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid LLM and image settings.");
            return Err(e);
        }
    };

    let http = reqwest::Client::new();
    let llm = llm::create_llm(&config, http.clone())?;
    let image = image::create_image_client(&config, http)?;

    let pipeline = pipeline::Pipeline::new(llm, image, config.pipeline.clone());

    server::start_server(config.port, server::AppState { pipeline }).await
}
