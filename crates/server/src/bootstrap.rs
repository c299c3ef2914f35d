use std::sync::Arc;

use projbot_agent::llm::LlmError;
use projbot_agent::openai::OpenAiClient;
use projbot_agent::operations::default_registry;
use projbot_agent::runtime::AgentRuntime;
use projbot_cliq::inbound::Normalizer;
use projbot_core::config::{AppConfig, ConfigError, LoadOptions};
use projbot_core::errors::ApiError;
use projbot_zoho::auth::{HttpTokenExchanger, TokenStore};
use projbot_zoho::client::ProjectsClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
    pub normalizer: Arc<Normalizer>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("backend client setup failed: {0}")]
    Backend(ApiError),
    #[error("reasoning client setup failed: {0}")]
    Llm(LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let exchanger = HttpTokenExchanger::new(&config.zoho).map_err(BootstrapError::Backend)?;
    let tokens = Arc::new(TokenStore::new(exchanger, config.zoho.token_safety_margin_secs));
    let client = Arc::new(
        ProjectsClient::over_http(&config.zoho, tokens, &config.pagination)
            .map_err(BootstrapError::Backend)?,
    );
    let llm = Arc::new(OpenAiClient::new(&config.llm).map_err(BootstrapError::Llm)?);

    let registry = default_registry();
    info!(
        event_name = "system.bootstrap.registry_ready",
        operations = registry.len(),
        portal_id = %config.zoho.portal_id,
        "operation registry assembled"
    );

    let runtime = Arc::new(AgentRuntime::new(llm, client, registry, &config.agent));
    let normalizer = Arc::new(Normalizer::new(&config.cliq));

    Ok(Application { config, runtime, normalizer })
}

#[cfg(test)]
mod tests {
    use projbot_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            zoho_client_id: Some("1000.CLIENT".to_string()),
            zoho_client_secret: Some("secret".to_string()),
            zoho_refresh_token: Some("1000.refresh".to_string()),
            zoho_portal_id: Some("700000123".to_string()),
            llm_api_key: Some("sk-test".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_succeeds_with_complete_credentials() {
        let app = bootstrap(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap succeeds with valid overrides");

        assert_eq!(app.runtime.catalog().len(), 11);
        assert_eq!(app.config.zoho.portal_id, "700000123");
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_backend_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                zoho_refresh_token: None,
                ..valid_overrides()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing credentials are rejected").to_string();
        assert!(message.contains("zoho.refresh_token"), "message was: {message}");
    }
}
