use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;

const SERPER_URL: &str = "https://google.serper.dev/search";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

// Pages whose extracted text is shorter than this are treated as
// paywalled or otherwise inaccessible and dropped.
const MIN_TEXT_CHARS: usize = 200;

const URL_SUGGEST_SYSTEM: &str = "You are a research assistant. Only return accessible, \
high-quality URLs with descriptive titles. Focus on authoritative sources that allow \
content access. Avoid paywalled sites and sites that block scraping.";

/// A candidate page discovered by search or LLM suggestion.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// A page that was successfully fetched and extracted. Lives only for the
/// duration of one request.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub url: String,
    pub title: String,
    pub text: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    title: Option<String>,
    link: String,
    #[allow(dead_code)]
    snippet: Option<String>,
}

pub struct Researcher {
    http: reqwest::Client,
    llm: LlmClient,
    model: String,
    serper_api_key: Option<String>,
    max_retries: u32,
    retry_base_ms: u64,
}

impl Researcher {
    pub fn new(
        llm: LlmClient,
        model: String,
        serper_api_key: Option<String>,
        max_retries: u32,
        retry_base_ms: u64,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
            model,
            serper_api_key,
            max_retries,
            retry_base_ms,
        }
    }

    /// Discover candidate pages and extract their text. Fetches twice as many
    /// hits as requested since some will be unreachable, and stops once
    /// `top_k_sites` sources have been extracted. When the search-API path
    /// yields fewer than `source_floor` usable sources, the LLM suggestion
    /// path tops the set up. Per-source failures are never fatal.
    pub async fn research(&self, question: &str, top_k_sites: usize) -> Result<Vec<SourceRecord>> {
        let floor = source_floor(top_k_sites);
        let (hits, via_search_api) = self.discover(question, top_k_sites * 2).await?;
        tracing::info!(hits = hits.len(), via_search_api, "source discovery complete");

        let mut tried = HashSet::new();
        let mut selected = Vec::new();
        let mut failed = 0usize;

        self.extract_until(&hits, top_k_sites, &mut tried, &mut selected, &mut failed)
            .await;

        // A search page full of unreachable results should not produce a
        // one-source answer while the suggestion path is still untried.
        if selected.len() < floor && via_search_api {
            tracing::warn!(
                selected = selected.len(),
                floor,
                "below source floor, topping up from LLM suggestions"
            );
            match self.llm_suggest_urls(question, top_k_sites * 2).await {
                Ok(extra) => {
                    self.extract_until(&extra, floor, &mut tried, &mut selected, &mut failed)
                        .await;
                }
                Err(err) => tracing::warn!("source top-up failed: {err:#}"),
            }
        }

        tracing::info!(
            selected = selected.len(),
            failed,
            "research complete"
        );
        Ok(selected)
    }

    async fn extract_until(
        &self,
        hits: &[SearchHit],
        want: usize,
        tried: &mut HashSet<String>,
        selected: &mut Vec<SourceRecord>,
        failed: &mut usize,
    ) {
        for hit in hits {
            if selected.len() >= want {
                break;
            }
            if !tried.insert(hit.url.clone()) {
                continue;
            }
            match self.fetch_and_extract(hit).await {
                Ok(source) => {
                    tracing::debug!(url = %source.url, chars = source.text.len(), "source extracted");
                    selected.push(source);
                }
                Err(err) => {
                    *failed += 1;
                    tracing::warn!(url = %hit.url, "source dropped: {err:#}");
                }
            }
        }
    }

    /// Serper first when a key is configured, LLM suggestion otherwise or on
    /// Serper failure. The flag reports which path produced the hits.
    async fn discover(&self, question: &str, num: usize) -> Result<(Vec<SearchHit>, bool)> {
        if self.serper_api_key.is_some() {
            match self.serper_search(question, num).await {
                Ok(hits) if !hits.is_empty() => return Ok((hits, true)),
                Ok(_) => tracing::warn!("search API returned no results, falling back to LLM"),
                Err(err) => tracing::warn!("search API failed, falling back to LLM: {err:#}"),
            }
        }
        Ok((self.llm_suggest_urls(question, num).await?, false))
    }

    async fn serper_search(&self, query: &str, num: usize) -> Result<Vec<SearchHit>> {
        let api_key = self
            .serper_api_key
            .as_deref()
            .context("SERPER_API_KEY not configured")?;

        let response = self
            .http
            .post(SERPER_URL)
            .header("X-API-KEY", api_key)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(15))
            .json(&SerperRequest { q: query, num })
            .send()
            .await
            .context("Failed to send request to search API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search API error ({}): {}", status, body);
        }

        let api_response: SerperResponse = response
            .json()
            .await
            .context("Failed to parse search API response")?;

        Ok(parse_serper_hits(api_response, num))
    }

    /// Ask the LLM for candidate URLs when the search API is unavailable.
    async fn llm_suggest_urls(&self, query: &str, num: usize) -> Result<Vec<SearchHit>> {
        let prompt = format!(
            "Find reliable, accessible articles about: {query}\n\n\
             Return {num} high-quality URLs from reputable sources.\n\
             Format exactly as a numbered list:\n\
             1. Descriptive Article Title — https://example.com/full-url"
        );

        let response = self
            .llm
            .complete_with_retry(&self.model, Some(URL_SUGGEST_SYSTEM), &prompt)
            .await
            .context("LLM URL suggestion failed")?;

        let hits = parse_suggested_urls(&response.text, num);
        if hits.is_empty() {
            anyhow::bail!("LLM returned no usable URLs");
        }
        Ok(hits)
    }

    /// GET the page with retry and extract readable text. Fails on blocked
    /// or empty pages so the caller can drop them.
    async fn fetch_and_extract(&self, hit: &SearchHit) -> Result<SourceRecord> {
        if !is_valid_url(&hit.url) {
            anyhow::bail!("invalid URL: {}", hit.url);
        }

        let mut attempt = 0;
        let response = loop {
            let result = self
                .http
                .get(&hit.url)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "text/html,application/xhtml+xml")
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .context("request failed")
                .and_then(|r| {
                    let status = r.status();
                    if status == reqwest::StatusCode::FORBIDDEN {
                        anyhow::bail!("site blocks access (403 Forbidden)");
                    }
                    if !status.is_success() {
                        anyhow::bail!("HTTP error: {}", status);
                    }
                    Ok(r)
                });

            match result {
                Ok(r) => break r,
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    let delay = self.retry_base_ms * 2u64.pow(attempt - 1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        };

        let body = response
            .bytes()
            .await
            .context("failed to read response body")?;

        let text = html2text::from_read(&body[..], 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string());
        let text = text.trim().to_string();

        if text.len() < MIN_TEXT_CHARS {
            anyhow::bail!("content too short or empty ({} chars)", text.len());
        }

        let title = if hit.title.trim().is_empty() {
            title_from_url(&hit.url)
        } else {
            hit.title.trim().to_string()
        };
        let summary = truncate_chars(&text, 300);

        Ok(SourceRecord {
            url: hit.url.clone(),
            title,
            text,
            summary,
        })
    }
}

fn parse_serper_hits(response: SerperResponse, num: usize) -> Vec<SearchHit> {
    response
        .organic
        .into_iter()
        .filter(|o| is_valid_url(&o.link))
        .map(|o| SearchHit {
            title: o.title.unwrap_or_default(),
            url: o.link,
        })
        .take(num)
        .collect()
}

/// Parse the LLM's `1. Title — URL` list. Lines that don't match the format
/// but contain a URL are salvaged with the URL as the hit.
pub fn parse_suggested_urls(text: &str, num: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains("http") {
            continue;
        }

        if let Some((title, url)) = line.split_once('—') {
            let title = title
                .trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ' ');
            let url = url.trim().trim_end_matches(['.', ',']);
            if is_valid_url(url) {
                hits.push(SearchHit {
                    title: title.to_string(),
                    url: url.to_string(),
                });
                continue;
            }
        }

        // Salvage: take the first URL-looking token on the line
        if let Some(start) = line.find("http") {
            let url: String = line[start..]
                .chars()
                .take_while(|c| !c.is_whitespace())
                .collect();
            let url = url.trim_end_matches(['.', ',', ')']);
            if is_valid_url(url) {
                let title = line[..start]
                    .trim()
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || c == '.' || c == '-' || c == ' '
                    })
                    .trim_end_matches(['—', '-', ' ']);
                hits.push(SearchHit {
                    title: if title.is_empty() {
                        "Article".to_string()
                    } else {
                        title.to_string()
                    },
                    url: url.to_string(),
                });
            }
        }
    }
    hits.truncate(num);
    hits
}

/// Fewest sources worth synthesizing from; below this the suggestion path
/// is tried before proceeding. Fabricated stand-in content is deliberately
/// not used to reach the floor: every citation must point at a real page.
pub fn source_floor(top_k_sites: usize) -> usize {
    top_k_sites.min(3).max(2)
}

pub fn is_valid_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            (parsed.scheme() == "http" || parsed.scheme() == "https")
                && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

fn title_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .replace(['-', '_'], " ")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_title_url_lines() {
        let text = "1. Continuous Discovery Habits — https://example.com/discovery\n\
                    2. Roadmap Prioritization Guide — https://example.com/roadmaps\n\
                    Some chatter without a link\n";
        let hits = parse_suggested_urls(text, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Continuous Discovery Habits");
        assert_eq!(hits[0].url, "https://example.com/discovery");
        assert_eq!(hits[1].url, "https://example.com/roadmaps");
    }

    #[test]
    fn salvages_lines_without_separator() {
        let text = "3. https://example.com/bare-url\n";
        let hits = parse_suggested_urls(text, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com/bare-url");
        assert_eq!(hits[0].title, "Article");
    }

    #[test]
    fn respects_result_limit() {
        let text = (1..=10)
            .map(|i| format!("{i}. Title {i} — https://example.com/{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let hits = parse_suggested_urls(&text, 3);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(is_valid_url("https://example.com/a"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com/a"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url("javascript:alert(1)"));
    }

    #[test]
    fn deserializes_serper_response() {
        let json = r#"{
            "organic": [
                {"title": "A", "link": "https://a.example/post", "snippet": "s"},
                {"title": "B", "link": "nonsense"},
                {"link": "https://c.example/"}
            ]
        }"#;
        let parsed: SerperResponse = serde_json::from_str(json).unwrap();
        let hits = parse_serper_hits(parsed, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.example/post");
        assert_eq!(hits[1].title, "");
    }

    #[test]
    fn serper_response_without_organic_is_empty() {
        let parsed: SerperResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_serper_hits(parsed, 10).is_empty());
    }

    #[test]
    fn source_floor_tracks_small_top_k() {
        assert_eq!(source_floor(1), 2);
        assert_eq!(source_floor(2), 2);
        assert_eq!(source_floor(3), 3);
        assert_eq!(source_floor(5), 3);
        assert_eq!(source_floor(10), 3);
    }

    #[test]
    fn derives_title_from_url_slug() {
        assert_eq!(
            title_from_url("https://example.com/why-roadmaps-fail/"),
            "why roadmaps fail"
        );
    }
}
