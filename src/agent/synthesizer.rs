use crate::agent::researcher::SourceRecord;
use crate::llm::{LlmClient, LlmResponse};

const SYSTEM_PROMPT: &str = r#"You are an expert research analyst. Given a question and numbered source excerpts, provide a structured, professional answer.

Guidelines:
- Synthesize information from the sources into a coherent answer
- Cite sources inline with [1], [2], etc., matching the source numbers
- Be specific — draw facts from the excerpts rather than making general statements
- If the evidence is insufficient or contradictory, say so
- Do NOT append a separate 'Sources' section"#;

// Excerpt size per source in the prompt, in characters.
const MAX_EXCERPT_CHARS: usize = 2500;

/// The synthesized (or fallback) answer for one question.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Markdown text with inline `[n]` citation markers.
    pub text: String,
    /// Ordered `[n] Title — URL` entries.
    pub citations: Vec<String>,
    /// True when generation failed and the answer is the raw source list.
    pub degraded: bool,
}

pub struct Synthesizer {
    llm: LlmClient,
    model: String,
}

impl Synthesizer {
    pub fn new(llm: LlmClient, model: String) -> Self {
        Self { llm, model }
    }

    /// Turn extracted sources into a cited answer. Generation failure after
    /// retries degrades to a source-list answer instead of an error.
    pub async fn synthesize(
        &self,
        question: &str,
        sources: &[SourceRecord],
    ) -> (Answer, LlmResponse) {
        let citations = build_citation_list(sources);
        let user_message = build_user_message(question, sources);

        match self
            .llm
            .complete_with_retry(&self.model, Some(SYSTEM_PROMPT), &user_message)
            .await
        {
            Ok(response) if !response.text.is_empty() => {
                let answer = Answer {
                    text: response.text.clone(),
                    citations,
                    degraded: false,
                };
                (answer, response)
            }
            Ok(response) => {
                tracing::warn!("LLM returned an empty answer, degrading to source list");
                (fallback_answer(question, sources, citations), response)
            }
            Err(err) => {
                tracing::warn!("synthesis failed after retries, degrading to source list: {err:#}");
                (
                    fallback_answer(question, sources, citations),
                    LlmResponse::default(),
                )
            }
        }
    }
}

fn build_user_message(question: &str, sources: &[SourceRecord]) -> String {
    let excerpts = sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let excerpt = first_chunk(&s.text, MAX_EXCERPT_CHARS);
            format!("[Source {}] {} ({})\n{}", i + 1, s.title, s.url, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Question: {question}\n\n\
         Source excerpts:\n{excerpts}\n\n\
         Answer clearly and cite sources inline using [1], [2], etc. \
         Do NOT include a 'Sources' section."
    )
}

pub fn build_citation_list(sources: &[SourceRecord]) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let title = if s.title.is_empty() { &s.url } else { &s.title };
            format!("[{}] {} — {}", i + 1, title, s.url)
        })
        .collect()
}

/// Answer assembled from the sources themselves when generation fails.
fn fallback_answer(question: &str, sources: &[SourceRecord], citations: Vec<String>) -> Answer {
    let summaries = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. **{}** — {}", i + 1, s.title, s.summary))
        .collect::<Vec<_>>()
        .join("\n");

    let text = format!(
        "I could not generate a full analysis right now, but the research for \
         \"{question}\" turned up {} relevant sources:\n\n{summaries}\n\n\
         Please try again in a few minutes for a synthesized answer.",
        sources.len()
    );

    Answer {
        text,
        citations,
        degraded: true,
    }
}

/// Greedy paragraph packing: paragraphs are joined until the next one would
/// exceed `max_chars`, then the prefix is returned.
pub fn first_chunk(text: &str, max_chars: usize) -> String {
    chunk_text(text, max_chars)
        .into_iter()
        .next()
        .unwrap_or_default()
}

pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let mut out = Vec::new();
    let mut cur = String::new();
    for p in paragraphs {
        if cur.is_empty() {
            cur = p.to_string();
        } else if cur.len() + p.len() + 2 > max_chars {
            out.push(cur);
            cur = p.to_string();
        } else {
            cur.push_str("\n\n");
            cur.push_str(p);
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, url: &str, text: &str) -> SourceRecord {
        SourceRecord {
            url: url.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            summary: text.chars().take(100).collect(),
        }
    }

    #[test]
    fn chunks_pack_paragraphs_up_to_limit() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = chunk_text(text, 11);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn chunking_skips_blank_paragraphs() {
        let chunks = chunk_text("one\n\n\n\n   \n\ntwo", 1000);
        assert_eq!(chunks, vec!["one\n\ntwo".to_string()]);
    }

    #[test]
    fn oversized_paragraph_becomes_its_own_chunk() {
        let big = "x".repeat(50);
        let chunks = chunk_text(&format!("{big}\n\nshort"), 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], big);
    }

    #[test]
    fn citation_list_is_numbered_from_one() {
        let sources = vec![
            source("First", "https://a.example/1", "text"),
            source("", "https://b.example/2", "text"),
        ];
        let citations = build_citation_list(&sources);
        assert_eq!(citations[0], "[1] First — https://a.example/1");
        // Untitled sources fall back to the URL
        assert_eq!(citations[1], "[2] https://b.example/2 — https://b.example/2");
    }

    #[test]
    fn fallback_answer_lists_every_source() {
        let sources = vec![
            source("Alpha", "https://a.example", "alpha text"),
            source("Beta", "https://b.example", "beta text"),
        ];
        let citations = build_citation_list(&sources);
        let answer = fallback_answer("what is tested?", &sources, citations);
        assert!(answer.degraded);
        assert!(answer.text.contains("**Alpha**"));
        assert!(answer.text.contains("**Beta**"));
        assert_eq!(answer.citations.len(), 2);
    }

    #[test]
    fn prompt_numbers_sources_to_match_citations() {
        let sources = vec![
            source("Alpha", "https://a.example", "alpha text"),
            source("Beta", "https://b.example", "beta text"),
        ];
        let msg = build_user_message("q", &sources);
        assert!(msg.contains("[Source 1] Alpha (https://a.example)"));
        assert!(msg.contains("[Source 2] Beta (https://b.example)"));
    }
}
