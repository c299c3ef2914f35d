use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use projbot_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "zoho.portal_id",
        &config.zoho.portal_id,
        source("zoho.portal_id", "PROJBOT_ZOHO_PORTAL_ID"),
    ));
    lines.push(render_line(
        "zoho.client_id",
        &config.zoho.client_id,
        source("zoho.client_id", "PROJBOT_ZOHO_CLIENT_ID"),
    ));
    lines.push(render_line(
        "zoho.client_secret",
        "<redacted>",
        source("zoho.client_secret", "PROJBOT_ZOHO_CLIENT_SECRET"),
    ));
    lines.push(render_line(
        "zoho.refresh_token",
        "<redacted>",
        source("zoho.refresh_token", "PROJBOT_ZOHO_REFRESH_TOKEN"),
    ));
    lines.push(render_line(
        "zoho.api_base_url",
        &config.zoho.api_base_url,
        source("zoho.api_base_url", "PROJBOT_ZOHO_API_BASE_URL"),
    ));
    lines.push(render_line(
        "zoho.auth_base_url",
        &config.zoho.auth_base_url,
        source("zoho.auth_base_url", "PROJBOT_ZOHO_AUTH_BASE_URL"),
    ));
    lines.push(render_line(
        "zoho.token_safety_margin_secs",
        &config.zoho.token_safety_margin_secs.to_string(),
        source("zoho.token_safety_margin_secs", "PROJBOT_ZOHO_TOKEN_SAFETY_MARGIN_SECS"),
    ));

    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line("llm.api_key", llm_api_key, source("llm.api_key", "PROJBOT_LLM_API_KEY")));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "PROJBOT_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", "PROJBOT_LLM_BASE_URL"),
    ));

    lines.push(render_line(
        "agent.max_iterations",
        &config.agent.max_iterations.to_string(),
        source("agent.max_iterations", "PROJBOT_AGENT_MAX_ITERATIONS"),
    ));
    lines.push(render_line(
        "agent.history_cap",
        &config.agent.history_cap.to_string(),
        source("agent.history_cap", "PROJBOT_AGENT_HISTORY_CAP"),
    ));
    lines.push(render_line(
        "pagination.max_pages",
        &config.pagination.max_pages.to_string(),
        source("pagination.max_pages", "PROJBOT_PAGINATION_MAX_PAGES"),
    ));
    lines.push(render_line(
        "pagination.page_size",
        &config.pagination.page_size.to_string(),
        source("pagination.page_size", "PROJBOT_PAGINATION_PAGE_SIZE"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "PROJBOT_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "PROJBOT_SERVER_PORT"),
    ));

    lines.push(render_line(
        "cliq.bot_aliases",
        &config.cliq.bot_aliases.join(", "),
        source("cliq.bot_aliases", "PROJBOT_CLIQ_BOT_ALIASES"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "PROJBOT_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "PROJBOT_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("projbot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/projbot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
