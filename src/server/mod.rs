use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::agent::Agent;
use crate::render::render_answer;

const MAX_QUESTION_CHARS: usize = 1000;
const MIN_QUESTION_CHARS: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    question: String,
}

/// JSON envelope for `/ask`. Absent fields are omitted so the failure shape
/// stays `{ ok, error }`.
#[derive(Debug, Default, Serialize)]
pub struct AskResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AskResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route_service("/", ServeFile::new("static/index.html"))
        .nest_service("/static", ServeDir::new("static"))
        .route("/health", get(health))
        .route("/ask", post(ask))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "factweave" }))
}

async fn ask(
    State(state): State<AppState>,
    Form(form): Form<AskForm>,
) -> (StatusCode, Json<AskResponse>) {
    let question = match validate_question(&form.question) {
        Ok(q) => q,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(AskResponse::error(message)));
        }
    };

    tracing::info!(question = %question, "processing question");

    match state.agent.ask(&question).await {
        Ok(result) => {
            let answer = result.answer;
            let html = render_answer(&answer.text, answer.citations.len());
            let warning = answer.degraded.then(|| {
                "AI analysis temporarily unavailable due to high demand. \
                 Showing raw sources instead."
                    .to_string()
            });

            let response = AskResponse {
                ok: true,
                answer: Some(answer.text),
                answer_html: Some(html),
                citations: Some(answer.citations),
                source_count: Some(result.source_count),
                processing_time: Some(result.processing_time),
                warning,
                error: None,
            };
            (StatusCode::OK, Json(response))
        }
        Err(err) => {
            tracing::error!("request failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AskResponse::error(format!("{err}"))),
            )
        }
    }
}

/// The frontend guards against empty questions too; this is the
/// authoritative check.
fn validate_question(raw: &str) -> Result<String, String> {
    let question = raw.trim();
    if question.is_empty() {
        return Err("Question cannot be empty".to_string());
    }
    if question.chars().count() < MIN_QUESTION_CHARS {
        return Err("Question is too short (min 3 characters)".to_string());
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err("Question is too long (max 1000 characters)".to_string());
    }
    Ok(question.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            openrouter_api_key: "test-key".into(),
            serper_api_key: None,
            openrouter_url: "http://localhost:1/v1/chat/completions".into(),
            synth_model: "test-model".into(),
            host: "127.0.0.1".into(),
            port: 0,
            top_k_sites: 2,
            max_retries: 1,
            retry_base_ms: 1,
        };
        AppState {
            agent: Arc::new(Agent::new(config).expect("agent")),
        }
    }

    #[test]
    fn rejects_empty_and_whitespace_questions() {
        assert!(validate_question("").is_err());
        assert!(validate_question("   \n\t").is_err());
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(validate_question("ab").is_err());
        assert!(validate_question(&"x".repeat(1001)).is_err());
        assert_eq!(validate_question("abc").unwrap(), "abc");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(
            validate_question("  why do roadmaps fail?  ").unwrap(),
            "why do roadmaps fail?"
        );
    }

    #[test]
    fn error_envelope_has_only_ok_and_error() {
        let json = serde_json::to_value(AskResponse::error("boom")).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("answer").is_none());
        assert!(json.get("citations").is_none());
    }

    #[tokio::test]
    async fn health_endpoint_responds_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_question_form_is_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ask")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("question=++"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
