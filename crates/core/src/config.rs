use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub zoho: ZohoConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub pagination: PaginationConfig,
    pub server: ServerConfig,
    pub cliq: CliqConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ZohoConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    pub portal_id: String,
    pub api_base_url: String,
    pub auth_base_url: String,
    /// Tokens within this margin of expiry are treated as stale.
    pub token_safety_margin_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub history_cap: usize,
    pub session_idle_secs: u64,
    pub turn_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaginationConfig {
    /// Continuation windows followed per list call before the result is
    /// surfaced as truncated.
    pub max_pages: u32,
    pub page_size: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct CliqConfig {
    /// Aliases stripped case-insensitively from the head of mentions.
    pub bot_aliases: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub zoho_client_id: Option<String>,
    pub zoho_client_secret: Option<String>,
    pub zoho_refresh_token: Option<String>,
    pub zoho_portal_id: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            zoho: ZohoConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                refresh_token: String::new().into(),
                portal_id: String::new(),
                api_base_url: "https://projectsapi.zoho.com".to_string(),
                auth_base_url: "https://accounts.zoho.com".to_string(),
                token_safety_margin_secs: 60,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.1,
                max_tokens: 2700,
                timeout_secs: 30,
            },
            agent: AgentConfig {
                max_iterations: 10,
                history_cap: 40,
                session_idle_secs: 3600,
                turn_timeout_secs: 60,
            },
            pagination: PaginationConfig { max_pages: 5, page_size: 100 },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            cliq: CliqConfig {
                bot_aliases: vec!["@projbot".to_string(), "projbot".to_string()],
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Precedence: defaults < file < `PROJBOT_*` env < programmatic
    /// overrides, then fail-fast validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("projbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(zoho) = patch.zoho {
            if let Some(client_id) = zoho.client_id {
                self.zoho.client_id = client_id;
            }
            if let Some(client_secret) = zoho.client_secret {
                self.zoho.client_secret = secret_value(client_secret);
            }
            if let Some(refresh_token) = zoho.refresh_token {
                self.zoho.refresh_token = secret_value(refresh_token);
            }
            if let Some(portal_id) = zoho.portal_id {
                self.zoho.portal_id = portal_id;
            }
            if let Some(api_base_url) = zoho.api_base_url {
                self.zoho.api_base_url = api_base_url;
            }
            if let Some(auth_base_url) = zoho.auth_base_url {
                self.zoho.auth_base_url = auth_base_url;
            }
            if let Some(margin) = zoho.token_safety_margin_secs {
                self.zoho.token_safety_margin_secs = margin;
            }
            if let Some(timeout_secs) = zoho.timeout_secs {
                self.zoho.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
            if let Some(history_cap) = agent.history_cap {
                self.agent.history_cap = history_cap;
            }
            if let Some(session_idle_secs) = agent.session_idle_secs {
                self.agent.session_idle_secs = session_idle_secs;
            }
            if let Some(turn_timeout_secs) = agent.turn_timeout_secs {
                self.agent.turn_timeout_secs = turn_timeout_secs;
            }
        }

        if let Some(pagination) = patch.pagination {
            if let Some(max_pages) = pagination.max_pages {
                self.pagination.max_pages = max_pages;
            }
            if let Some(page_size) = pagination.page_size {
                self.pagination.page_size = page_size;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(cliq) = patch.cliq {
            if let Some(bot_aliases) = cliq.bot_aliases {
                self.cliq.bot_aliases = bot_aliases;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PROJBOT_ZOHO_CLIENT_ID") {
            self.zoho.client_id = value;
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_CLIENT_SECRET") {
            self.zoho.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_REFRESH_TOKEN") {
            self.zoho.refresh_token = secret_value(value);
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_PORTAL_ID") {
            self.zoho.portal_id = value;
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_API_BASE_URL") {
            self.zoho.api_base_url = value;
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_AUTH_BASE_URL") {
            self.zoho.auth_base_url = value;
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_TOKEN_SAFETY_MARGIN_SECS") {
            self.zoho.token_safety_margin_secs =
                parse_u64("PROJBOT_ZOHO_TOKEN_SAFETY_MARGIN_SECS", &value)?;
        }
        if let Some(value) = read_env("PROJBOT_ZOHO_TIMEOUT_SECS") {
            self.zoho.timeout_secs = parse_u64("PROJBOT_ZOHO_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROJBOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PROJBOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("PROJBOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PROJBOT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f64("PROJBOT_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("PROJBOT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("PROJBOT_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("PROJBOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PROJBOT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROJBOT_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("PROJBOT_AGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("PROJBOT_AGENT_HISTORY_CAP") {
            self.agent.history_cap =
                parse_u32("PROJBOT_AGENT_HISTORY_CAP", &value)? as usize;
        }
        if let Some(value) = read_env("PROJBOT_AGENT_SESSION_IDLE_SECS") {
            self.agent.session_idle_secs = parse_u64("PROJBOT_AGENT_SESSION_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("PROJBOT_AGENT_TURN_TIMEOUT_SECS") {
            self.agent.turn_timeout_secs = parse_u64("PROJBOT_AGENT_TURN_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROJBOT_PAGINATION_MAX_PAGES") {
            self.pagination.max_pages = parse_u32("PROJBOT_PAGINATION_MAX_PAGES", &value)?;
        }
        if let Some(value) = read_env("PROJBOT_PAGINATION_PAGE_SIZE") {
            self.pagination.page_size = parse_u32("PROJBOT_PAGINATION_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("PROJBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROJBOT_SERVER_PORT") {
            self.server.port = parse_u16("PROJBOT_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("PROJBOT_CLIQ_BOT_ALIASES") {
            self.cliq.bot_aliases = value
                .split(',')
                .map(|alias| alias.trim().to_string())
                .filter(|alias| !alias.is_empty())
                .collect();
        }

        let log_level = read_env("PROJBOT_LOGGING_LEVEL").or_else(|| read_env("PROJBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROJBOT_LOGGING_FORMAT").or_else(|| read_env("PROJBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(client_id) = overrides.zoho_client_id {
            self.zoho.client_id = client_id;
        }
        if let Some(client_secret) = overrides.zoho_client_secret {
            self.zoho.client_secret = secret_value(client_secret);
        }
        if let Some(refresh_token) = overrides.zoho_refresh_token {
            self.zoho.refresh_token = secret_value(refresh_token);
        }
        if let Some(portal_id) = overrides.zoho_portal_id {
            self.zoho.portal_id = portal_id;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_zoho(&self.zoho)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_pagination(&self.pagination)?;
        validate_server(&self.server)?;
        validate_cliq(&self.cliq)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("projbot.toml"), PathBuf::from("config/projbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_zoho(zoho: &ZohoConfig) -> Result<(), ConfigError> {
    if zoho.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "zoho.client_id is required. Register a self client at https://api-console.zoho.com"
                .to_string(),
        ));
    }
    if zoho.client_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("zoho.client_secret is required".to_string()));
    }
    if zoho.refresh_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "zoho.refresh_token is required. Generate one from the self-client grant flow"
                .to_string(),
        ));
    }
    if zoho.portal_id.trim().is_empty() {
        return Err(ConfigError::Validation("zoho.portal_id is required".to_string()));
    }
    validate_http_url("zoho.api_base_url", &zoho.api_base_url)?;
    validate_http_url("zoho.auth_base_url", &zoho.auth_base_url)?;
    if zoho.token_safety_margin_secs == 0 || zoho.token_safety_margin_secs > 600 {
        return Err(ConfigError::Validation(
            "zoho.token_safety_margin_secs must be in range 1..=600".to_string(),
        ));
    }
    if zoho.timeout_secs == 0 || zoho.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "zoho.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    let missing_key =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation("llm.api_key is required".to_string()));
    }
    validate_http_url("llm.base_url", &llm.base_url)?;
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > 50 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be in range 1..=50".to_string(),
        ));
    }
    if agent.history_cap == 0 || agent.history_cap > 500 {
        return Err(ConfigError::Validation(
            "agent.history_cap must be in range 1..=500".to_string(),
        ));
    }
    if agent.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.session_idle_secs must be greater than zero".to_string(),
        ));
    }
    if agent.turn_timeout_secs == 0 || agent.turn_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "agent.turn_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_pagination(pagination: &PaginationConfig) -> Result<(), ConfigError> {
    if pagination.max_pages == 0 || pagination.max_pages > 100 {
        return Err(ConfigError::Validation(
            "pagination.max_pages must be in range 1..=100".to_string(),
        ));
    }
    if pagination.page_size == 0 || pagination.page_size > 200 {
        return Err(ConfigError::Validation(
            "pagination.page_size must be in range 1..=200".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_cliq(cliq: &CliqConfig) -> Result<(), ConfigError> {
    if cliq.bot_aliases.is_empty() {
        return Err(ConfigError::Validation(
            "cliq.bot_aliases must contain at least one alias".to_string(),
        ));
    }
    if cliq.bot_aliases.iter().any(|alias| alias.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "cliq.bot_aliases entries must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    zoho: Option<ZohoPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    pagination: Option<PaginationPatch>,
    server: Option<ServerPatch>,
    cliq: Option<CliqPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ZohoPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    portal_id: Option<String>,
    api_base_url: Option<String>,
    auth_base_url: Option<String>,
    token_safety_margin_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
    history_cap: Option<usize>,
    session_idle_secs: Option<u64>,
    turn_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaginationPatch {
    max_pages: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct CliqPatch {
    bot_aliases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_env() {
        env::set_var("PROJBOT_ZOHO_CLIENT_ID", "1000.TESTCLIENT");
        env::set_var("PROJBOT_ZOHO_CLIENT_SECRET", "test-client-secret");
        env::set_var("PROJBOT_ZOHO_REFRESH_TOKEN", "1000.refresh.value");
        env::set_var("PROJBOT_ZOHO_PORTAL_ID", "700000123");
        env::set_var("PROJBOT_LLM_API_KEY", "sk-test-key");
    }

    const REQUIRED_VARS: &[&str] = &[
        "PROJBOT_ZOHO_CLIENT_ID",
        "PROJBOT_ZOHO_CLIENT_SECRET",
        "PROJBOT_ZOHO_REFRESH_TOKEN",
        "PROJBOT_ZOHO_PORTAL_ID",
        "PROJBOT_LLM_API_KEY",
    ];

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("TEST_ZOHO_REFRESH", "1000.refresh.from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("projbot.toml");
            fs::write(
                &path,
                r#"
[zoho]
refresh_token = "${TEST_ZOHO_REFRESH}"
"#,
            )
            .map_err(|err| err.to_string())?;

            // Env override for the same key must not shadow this check.
            env::remove_var("PROJBOT_ZOHO_REFRESH_TOKEN");
            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.zoho.refresh_token.expose_secret() == "1000.refresh.from-env",
                "refresh token should be interpolated from environment",
            )
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["TEST_ZOHO_REFRESH"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("PROJBOT_LOG_LEVEL", "warn");
        env::set_var("PROJBOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["PROJBOT_LOG_LEVEL", "PROJBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("PROJBOT_ZOHO_PORTAL_ID", "portal-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("projbot.toml");
            fs::write(
                &path,
                r#"
[zoho]
portal_id = "portal-from-file"

[llm]
model = "model-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    llm_model: Some("model-from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-override", "override model should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.zoho.portal_id == "portal-from-env",
                "env portal id should win over file and defaults",
            )
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::remove_var("PROJBOT_ZOHO_REFRESH_TOKEN");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("zoho.refresh_token")
            );
            ensure(has_message, "validation failure should mention zoho.refresh_token")
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("test-client-secret"),
                "debug output should not contain the client secret",
            )?;
            ensure(
                !debug.contains("1000.refresh.value"),
                "debug output should not contain the refresh token",
            )?;
            ensure(!debug.contains("sk-test-key"), "debug output should not contain the api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = match AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Err(ConfigError::MissingConfigFile(_)) => Ok(()),
            Err(other) => Err(format!("expected MissingConfigFile, got {other}")),
            Ok(_) => Err("expected load to fail".to_string()),
        };

        result
    }
}
