use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// One `/ask` request, appended to `logs/runs.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub timestamp: String,
    pub question: String,
    pub sources_found: u32,
    pub research_latency_ms: u64,
    pub synthesis_latency_ms: u64,
    pub llm_input_tokens: u32,
    pub llm_output_tokens: u32,
    pub llm_cost: f64,
    pub degraded: bool,
    pub total_latency_ms: u64,
    pub answer_chars: u32,
}

impl RunLog {
    pub fn total_tokens(&self) -> u32 {
        self.llm_input_tokens + self.llm_output_tokens
    }

    pub fn summary(&self) -> String {
        format!(
            "Sources: {} | Total latency: {:.1}s | Tokens used by LLM: {} | Cost: ${:.4}{}",
            self.sources_found,
            self.total_latency_ms as f64 / 1000.0,
            self.total_tokens(),
            self.llm_cost,
            if self.degraded { " | degraded" } else { "" },
        )
    }
}

pub struct RunLogger {
    dir: PathBuf,
}

impl RunLogger {
    pub fn new(dir: &str) -> Result<Self> {
        let dir = PathBuf::from(dir);
        fs::create_dir_all(&dir).context("Failed to create logs directory")?;
        Ok(Self { dir })
    }

    pub fn write(&self, run_log: &RunLog) -> Result<()> {
        let path = self.dir.join("runs.jsonl");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open log file")?;

        let json = serde_json::to_string(run_log).context("Failed to serialize run log")?;
        writeln!(file, "{}", json).context("Failed to write log")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_flags_degraded_runs() {
        let log = RunLog {
            id: "x".into(),
            timestamp: "t".into(),
            question: "q".into(),
            sources_found: 3,
            research_latency_ms: 100,
            synthesis_latency_ms: 200,
            llm_input_tokens: 10,
            llm_output_tokens: 5,
            llm_cost: 0.0,
            degraded: true,
            total_latency_ms: 300,
            answer_chars: 42,
        };
        assert_eq!(log.total_tokens(), 15);
        assert!(log.summary().contains("degraded"));
        assert!(log.summary().contains("Sources: 3"));
    }
}
