//! Scripted fakes shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use projbot_core::config::PaginationConfig;
use projbot_core::errors::ApiError;
use projbot_core::session::Message;
use projbot_zoho::auth::{TokenExchanger, TokenGrant, TokenStore};
use projbot_zoho::client::ProjectsClient;
use projbot_zoho::transport::{ApiRequest, SendError, Transport};
use serde_json::Value;

use crate::llm::{Decision, LlmClient, LlmError};

pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, SendError>>>,
    seen: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Result<Value, SendError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), seen: Mutex::new(Vec::new()) })
    }

    pub(crate) fn seen(&self) -> Vec<ApiRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, SendError> {
        self.seen.lock().expect("seen lock").push(request);
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(SendError::Network("script exhausted".into())))
    }
}

struct StaticExchanger;

#[async_trait]
impl TokenExchanger for StaticExchanger {
    async fn exchange(&self) -> Result<TokenGrant, ApiError> {
        Ok(TokenGrant { access_token: "test-token".into(), expires_in_secs: 3600 })
    }
}

pub(crate) fn projects_client(transport: Arc<ScriptedTransport>) -> ProjectsClient {
    let tokens = Arc::new(TokenStore::new(StaticExchanger, 60));
    ProjectsClient::new(
        transport,
        tokens,
        "700000123",
        &PaginationConfig { max_pages: 5, page_size: 100 },
    )
}

pub(crate) struct ScriptedLlm {
    script: Mutex<VecDeque<Result<Decision, LlmError>>>,
    pub(crate) prompts_seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub(crate) fn new(script: Vec<Result<Decision, LlmError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), prompts_seen: Mutex::new(Vec::new()) })
    }

    /// Scripts that never answer, for exercising the iteration limit.
    pub(crate) fn always(decision: Decision) -> Arc<Self> {
        let script = Self::new(Vec::new());
        *script.script.lock().expect("script lock") =
            std::iter::repeat_with(|| Ok(decision.clone())).take(64).collect();
        script
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn decide(&self, messages: &[Message], _tools: &[Value]) -> Result<Decision, LlmError> {
        self.prompts_seen.lock().expect("prompts lock").push(messages.to_vec());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Protocol("script exhausted".into())))
    }
}
