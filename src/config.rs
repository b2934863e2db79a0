use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub serper_api_key: Option<String>,
    pub openrouter_url: String,
    pub synth_model: String,
    pub host: String,
    pub port: u16,
    pub top_k_sites: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY")
                .context("OPENROUTER_API_KEY must be set")?,
            serper_api_key: std::env::var("SERPER_API_KEY").ok(),
            openrouter_url: std::env::var("OPENROUTER_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".into()),
            synth_model: std::env::var("SYNTH_MODEL")
                .unwrap_or_else(|_| "google/gemini-2.0-flash-exp:free".into()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .context("PORT must be a number")?,
            top_k_sites: std::env::var("TOP_K_SITES")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .context("TOP_K_SITES must be a number")?,
            max_retries: std::env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .context("MAX_RETRIES must be a number")?,
            retry_base_ms: std::env::var("RETRY_BASE_MS")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .context("RETRY_BASE_MS must be a number")?,
        })
    }
}
