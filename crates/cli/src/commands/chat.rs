use std::io::{self, BufRead, Write};
use std::sync::Arc;

use projbot_agent::openai::OpenAiClient;
use projbot_agent::operations::default_registry;
use projbot_agent::runtime::{AgentRuntime, TurnReply};
use projbot_core::config::{AppConfig, LoadOptions};
use projbot_zoho::auth::{HttpTokenExchanger, TokenStore};
use projbot_zoho::client::ProjectsClient;

use super::CommandResult;

/// Interactive chat against the live backend. One session for the whole
/// process, so follow-up questions keep their context.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult { exit_code: 1, output: format!("config validation failed: {error}") }
        }
    };

    let runtime = match build_runtime(&config) {
        Ok(runtime) => runtime,
        Err(message) => return CommandResult { exit_code: 1, output: message },
    };

    let tokio_runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            return CommandResult {
                exit_code: 1,
                output: format!("failed to initialize async runtime: {error}"),
            }
        }
    };

    println!("projbot chat - ask about your projects, or type 'exit' to leave");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("you> ");
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        match tokio_runtime.block_on(runtime.submit_utterance("cli", text)) {
            Ok(reply) => print_reply(&reply),
            Err(error) => println!("bot> {}", error.user_message()),
        }
    }

    CommandResult { exit_code: 0, output: "goodbye".to_string() }
}

fn build_runtime(config: &AppConfig) -> Result<AgentRuntime, String> {
    let exchanger = HttpTokenExchanger::new(&config.zoho).map_err(|error| error.to_string())?;
    let tokens = Arc::new(TokenStore::new(exchanger, config.zoho.token_safety_margin_secs));
    let client = Arc::new(
        ProjectsClient::over_http(&config.zoho, tokens, &config.pagination)
            .map_err(|error| error.to_string())?,
    );
    let llm = Arc::new(OpenAiClient::new(&config.llm).map_err(|error| error.to_string())?);

    Ok(AgentRuntime::new(llm, client, default_registry(), &config.agent))
}

fn print_reply(reply: &TurnReply) {
    match &reply.card {
        Some(card) => {
            println!("bot> [{}]", card.title);
            for section in &card.sections {
                for element in &section.elements {
                    println!("     {}", element.text);
                }
            }
        }
        None => println!("bot> {}", reply.text),
    }
}
