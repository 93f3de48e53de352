use std::sync::Arc;

use agent::{ChatService, ServiceError};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatParams {
    question: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct ChatReply {
    response: String,
}

impl ChatReply {
    fn new(response: impl Into<String>) -> Json<Self> {
        Json(Self {
            response: response.into(),
        })
    }
}

pub(crate) fn router(service: Arc<ChatService>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(service)
}

// POST /chat?question=...  (a JSON body {"question": ...} also works)
async fn chat(
    State(service): State<Arc<ChatService>>,
    Query(params): Query<ChatParams>,
    body: Option<Json<ChatParams>>,
) -> (StatusCode, Json<ChatReply>) {
    let question = params
        .question
        .or_else(|| body.and_then(|Json(body)| body.question))
        .filter(|q| !q.trim().is_empty());

    let Some(question) = question else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            ChatReply::new("Error: missing 'question' parameter."),
        );
    };

    tracing::info!(question = %question, "chat request");

    match service.ask(&question).await {
        Ok(answer) => (StatusCode::OK, ChatReply::new(answer)),
        Err(err @ ServiceError::NotInitialized(_)) => {
            (StatusCode::OK, ChatReply::new(format!("Error: {err}")))
        }
        Err(err) => {
            tracing::error!("error executing agent: {err}");
            (
                StatusCode::OK,
                ChatReply::new(format!("An error occurred: {err}")),
            )
        }
    }
}

// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "SQL chat agent API is running",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent::{Agent, ToolError, ToolExecutor};
    use ai::{AiError, ChatModel, Message, Tool};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ChatModel for Echo {
        async fn complete(&self, messages: &[Message], _: &[Tool]) -> Result<Message, AiError> {
            let question = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Message::assistant(format!("you asked: {question}")))
        }
    }

    struct Failing;

    #[async_trait]
    impl ChatModel for Failing {
        async fn complete(&self, _: &[Message], _: &[Tool]) -> Result<Message, AiError> {
            Err(AiError::EmptyResponse)
        }
    }

    struct NoTools;

    #[async_trait]
    impl ToolExecutor for NoTools {
        fn definitions(&self) -> Vec<Tool> {
            vec![]
        }

        async fn invoke(&self, name: &str, _: &Value) -> Result<String, ToolError> {
            Err(ToolError::NotFound(name.to_string()))
        }
    }

    fn ready(model: impl ChatModel + 'static) -> Arc<ChatService> {
        Arc::new(ChatService::ready(Agent::new(
            Arc::new(model),
            Arc::new(NoTools),
        )))
    }

    fn asking(question: &str) -> Query<ChatParams> {
        Query(ChatParams {
            question: Some(question.to_string()),
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn chat_returns_answer() {
        let (status, Json(reply)) = chat(State(ready(Echo)), asking("how many films?"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.response, "you asked: how many films?");
    }

    #[tokio::test]
    async fn chat_accepts_json_body() {
        let body = Json(ChatParams {
            question: Some("hi".to_string()),
        });
        let (_, Json(reply)) =
            chat(State(ready(Echo)), Query(ChatParams::default()), Some(body)).await;
        assert_eq!(reply.response, "you asked: hi");
    }

    #[tokio::test]
    async fn uninitialized_service_yields_error_payload() {
        let service = Arc::new(ChatService::unavailable("GOOGLE_API_KEY"));
        let (status, Json(reply)) = chat(State(service), asking("List the first 5 actors"), None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(reply.response.starts_with("Error: LLM not initialized"));
    }

    #[tokio::test]
    async fn agent_failure_is_wrapped() {
        let (status, Json(reply)) = chat(State(ready(Failing)), asking("q"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(reply.response.starts_with("An error occurred: "));
    }

    #[tokio::test]
    async fn missing_question_is_rejected() {
        let (status, Json(reply)) =
            chat(State(ready(Echo)), Query(ChatParams::default()), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(reply.response.contains("question"));
    }

    async fn send(service: Arc<ChatService>, method: &str, uri: &str) -> (StatusCode, Value) {
        use axum::body::{Body, to_bytes};
        use axum::http::Request;
        use tower::ServiceExt;

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(service).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn router_serves_chat_over_post() {
        let (status, body) = send(ready(Echo), "POST", "/chat?question=List%20actors").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "you asked: List actors");
    }

    #[tokio::test]
    async fn router_serves_health_over_get() {
        let (status, body) = send(ready(Echo), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn router_rejects_wrong_methods_and_paths() {
        let (status, _) = send(ready(Echo), "GET", "/chat?question=hi").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(ready(Echo), "POST", "/health").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(ready(Echo), "GET", "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
