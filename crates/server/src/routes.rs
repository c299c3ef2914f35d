use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use projbot_agent::runtime::AgentRuntime;
use projbot_cliq::inbound::{InboundEvent, Normalizer, Routed};
use projbot_cliq::outbound::{error_reply, format_reply, help_card, CliqResponse};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::bootstrap::Application;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub normalizer: Arc<Normalizer>,
    pub turn_timeout: Duration,
}

impl AppState {
    pub fn from_application(app: &Application) -> Self {
        Self {
            runtime: app.runtime.clone(),
            normalizer: app.normalizer.clone(),
            turn_timeout: Duration::from_secs(app.config.agent.turn_timeout_secs),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cliq/webhook", post(webhook))
        .route("/cliq/status", get(status))
        .route("/health", get(crate::health::health))
        .with_state(state)
}

/// Inbound chat events. Always answers 200 with a reply payload; turn
/// failures become user-safe text instead of HTTP errors.
async fn webhook(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Json<CliqResponse> {
    match state.normalizer.route(&event) {
        Routed::Drop(reason) => {
            debug!(event_name = "server.webhook.dropped", reason = ?reason);
            Json(CliqResponse::silent())
        }
        Routed::Help => Json(help_card(&state.runtime.catalog())),
        Routed::Turn { session_id, text } => {
            let turn = state.runtime.submit_utterance(&session_id, &text);
            match tokio::time::timeout(state.turn_timeout, turn).await {
                Ok(Ok(reply)) => Json(format_reply(reply)),
                Ok(Err(error)) => {
                    warn!(
                        event_name = "server.webhook.turn_failed",
                        session_id = %session_id,
                        error = %error,
                    );
                    Json(error_reply(&error))
                }
                Err(_elapsed) => {
                    warn!(
                        event_name = "server.webhook.turn_timeout",
                        session_id = %session_id,
                        timeout_secs = state.turn_timeout.as_secs(),
                    );
                    Json(CliqResponse::text(
                        "That request took too long to answer. Please try again, \
                         perhaps with a narrower question.",
                    ))
                }
            }
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "active",
        "integration": "zoho_cliq",
        "operations": state.runtime.catalog().len(),
        "active_sessions": state.runtime.session_count().await,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use projbot_agent::llm::{Decision, LlmClient, LlmError};
    use projbot_agent::operations::default_registry;
    use projbot_agent::runtime::AgentRuntime;
    use projbot_cliq::inbound::Normalizer;
    use projbot_core::config::{AgentConfig, CliqConfig, PaginationConfig};
    use projbot_core::errors::ApiError;
    use projbot_core::session::Message;
    use projbot_zoho::auth::{TokenExchanger, TokenGrant, TokenStore};
    use projbot_zoho::client::ProjectsClient;
    use projbot_zoho::transport::{ApiRequest, SendError, Transport};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use super::{router, AppState};

    struct StaticExchanger;

    #[async_trait]
    impl TokenExchanger for StaticExchanger {
        async fn exchange(&self) -> Result<TokenGrant, ApiError> {
            Ok(TokenGrant { access_token: "test-token".into(), expires_in_secs: 3600 })
        }
    }

    struct UnreachableTransport;

    #[async_trait]
    impl Transport for UnreachableTransport {
        async fn send(&self, _request: ApiRequest) -> Result<Value, SendError> {
            Err(SendError::Network("no backend in tests".into()))
        }
    }

    struct FixedLlm {
        answer: String,
        delay: Duration,
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn decide(
            &self,
            _messages: &[Message],
            _tools: &[Value],
        ) -> Result<Decision, LlmError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Decision::Final(self.answer.clone()))
        }
    }

    fn state(llm: FixedLlm, turn_timeout: Duration) -> AppState {
        let tokens = Arc::new(TokenStore::new(StaticExchanger, 60));
        let client = Arc::new(ProjectsClient::new(
            Arc::new(UnreachableTransport),
            tokens,
            "700000123",
            &PaginationConfig { max_pages: 5, page_size: 100 },
        ));
        let agent = AgentConfig {
            max_iterations: 10,
            history_cap: 40,
            session_idle_secs: 3600,
            turn_timeout_secs: 60,
        };
        AppState {
            runtime: Arc::new(AgentRuntime::new(
                Arc::new(llm),
                client,
                default_registry(),
                &agent,
            )),
            normalizer: Arc::new(Normalizer::new(&CliqConfig {
                bot_aliases: vec!["@projbot".to_string(), "projbot".to_string()],
            })),
            turn_timeout,
        }
    }

    async fn post_webhook(state: AppState, event: Value) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cliq/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(event.to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("router answers");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body reads");
        (status, serde_json::from_slice(&bytes).expect("body is json"))
    }

    #[tokio::test]
    async fn addressed_messages_run_a_turn() {
        let llm = FixedLlm { answer: "You have 2 open projects.".into(), delay: Duration::ZERO };
        let (status, body) = post_webhook(
            state(llm, Duration::from_secs(5)),
            json!({
                "text": "how many projects are open?",
                "user": { "id": "u1", "name": "Ada" },
                "chat": { "id": "c1", "type": "direct" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "You have 2 open projects.");
        assert!(body.get("card").is_none());
    }

    #[tokio::test]
    async fn unaddressed_channel_chatter_is_acknowledged_silently() {
        let llm = FixedLlm { answer: "should never run".into(), delay: Duration::ZERO };
        let (status, body) = post_webhook(
            state(llm, Duration::from_secs(5)),
            json!({
                "text": "lunch anyone?",
                "user": { "id": "u1" },
                "chat": { "id": "c1", "type": "channel" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "");
    }

    #[tokio::test]
    async fn a_bare_mention_gets_the_help_card() {
        let llm = FixedLlm { answer: "should never run".into(), delay: Duration::ZERO };
        let (status, body) = post_webhook(
            state(llm, Duration::from_secs(5)),
            json!({
                "text": "@projbot",
                "user": { "id": "u1" },
                "chat": { "id": "c1", "type": "channel" },
                "mentions": [{ "type": "bot" }]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("text").is_none());
        assert_eq!(body["card"]["theme"], "modern-inline");
    }

    #[tokio::test]
    async fn a_stuck_turn_times_out_with_a_user_safe_message() {
        let llm = FixedLlm { answer: "too late".into(), delay: Duration::from_millis(200) };
        let (status, body) = post_webhook(
            state(llm, Duration::from_millis(20)),
            json!({
                "text": "anything",
                "user": { "id": "u1" },
                "chat": { "id": "c1", "type": "direct" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let text = body["text"].as_str().expect("text reply");
        assert!(text.contains("too long"), "was: {text}");
    }

    #[tokio::test]
    async fn the_status_endpoint_reports_the_catalog() {
        let llm = FixedLlm { answer: "unused".into(), delay: Duration::ZERO };
        let response = router(state(llm, Duration::from_secs(5)))
            .oneshot(
                Request::builder()
                    .uri("/cliq/status")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router answers");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body reads");
        let body: Value = serde_json::from_slice(&bytes).expect("body is json");
        assert_eq!(body["status"], "active");
        assert_eq!(body["operations"], 11);
        assert_eq!(body["active_sessions"], 0);
    }
}
