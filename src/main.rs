mod config;
mod handlers;
mod models;
mod services;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;

use config::Config;
use handlers::{AnalysisPipeline, Validator};
use services::{
    authenticate, FileTokenStore, HttpImageFetcher, OpenAiVisionClient, PhotoLibraryClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    dotenv().ok();

    let config = Config::from_env()?;

    let vision = Arc::new(OpenAiVisionClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.max_output_tokens,
    ));
    log::info!("✅ Vision client initialized with model: {}", config.openai_model);

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        // `froods validate [dir]` checks the fixture set instead of the library.
        Some("validate") => {
            let dir = args
                .next()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("validation"));
            Validator::new(vision).run(&dir).await
        }
        Some(other) => anyhow::bail!("unknown mode '{}', expected no argument or 'validate'", other),
        None => {
            let token_store = FileTokenStore::new(
                config.token_file.clone(),
                config.credentials_file.clone(),
                config.auth_port,
            );
            let credential = authenticate(&token_store)
                .await
                .context("photo library authentication failed")?;
            log::info!("✅ Credentials ready");

            let photos = Arc::new(PhotoLibraryClient::new(credential));
            let fetcher = Arc::new(HttpImageFetcher::new());
            let pipeline = AnalysisPipeline::new(photos, fetcher, vision);
            pipeline.run(config.search_term.as_deref(), config.date).await
        }
    }
}
