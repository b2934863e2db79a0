pub mod researcher;
pub mod synthesizer;

use anyhow::Result;
use std::time::Instant;

use crate::config::Config;
use crate::instrumentation::{RunLog, RunLogger};
use crate::llm::LlmClient;

use researcher::Researcher;
use synthesizer::{Answer, Synthesizer};

/// Researcher + Synthesizer pipeline for one question. Holds no per-request
/// state; safe to share behind an `Arc`.
pub struct Agent {
    researcher: Researcher,
    synthesizer: Synthesizer,
    config: Config,
    logger: RunLogger,
}

/// What the server hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct AgentAnswer {
    pub answer: Answer,
    pub source_count: usize,
    pub processing_time: f64,
}

impl Agent {
    pub fn new(config: Config) -> Result<Self> {
        let llm = LlmClient::new(
            &config.openrouter_api_key,
            &config.openrouter_url,
            config.max_retries,
            config.retry_base_ms,
        );
        let researcher = Researcher::new(
            llm.clone(),
            config.synth_model.clone(),
            config.serper_api_key.clone(),
            config.max_retries,
            config.retry_base_ms,
        );
        let synthesizer = Synthesizer::new(llm, config.synth_model.clone());
        let logger = RunLogger::new("logs")?;

        Ok(Self {
            researcher,
            synthesizer,
            config,
            logger,
        })
    }

    pub async fn ask(&self, question: &str) -> Result<AgentAnswer> {
        let run_start = Instant::now();

        let research_start = Instant::now();
        let sources = self
            .researcher
            .research(question, self.config.top_k_sites)
            .await?;
        let research_latency = research_start.elapsed().as_millis() as u64;

        if sources.is_empty() {
            anyhow::bail!(
                "Unable to find relevant sources for your question. \
                 Please try rephrasing your query."
            );
        }

        let synth_start = Instant::now();
        let (answer, llm_response) = self.synthesizer.synthesize(question, &sources).await;
        let synth_latency = synth_start.elapsed().as_millis() as u64;

        let total_latency = run_start.elapsed().as_millis() as u64;

        let run_log = RunLog {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            question: question.to_string(),
            sources_found: sources.len() as u32,
            research_latency_ms: research_latency,
            synthesis_latency_ms: synth_latency,
            llm_input_tokens: llm_response.input_tokens,
            llm_output_tokens: llm_response.output_tokens,
            llm_cost: llm_response.cost,
            degraded: answer.degraded,
            total_latency_ms: total_latency,
            answer_chars: answer.text.len() as u32,
        };

        if let Err(err) = self.logger.write(&run_log) {
            tracing::warn!("failed to write run log: {err:#}");
        }
        tracing::info!("{}", run_log.summary());

        Ok(AgentAnswer {
            answer,
            source_count: sources.len(),
            processing_time: total_latency as f64 / 1000.0,
        })
    }
}
