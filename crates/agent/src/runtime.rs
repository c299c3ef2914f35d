use std::sync::Arc;

use projbot_core::card::{Card, CardBuilder};
use projbot_core::config::AgentConfig;
use projbot_core::errors::{FailureKind, TurnError};
use projbot_core::session::{Message, SessionStore};
use projbot_zoho::client::ProjectsClient;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::{Decision, LlmClient};
use crate::tools::{OperationRegistry, OperationResult, OperationSpec};

const SYSTEM_PROMPT: &str = "You are a project management assistant backed by Zoho Projects. \
    Use the provided operations to answer questions and carry out requests. \
    Dates are formatted MM-DD-YYYY and time log hours HH:MM. \
    When an id is ambiguous, search first instead of guessing. \
    If an operation reports a failure, read its message and either correct \
    the call or explain the problem to the user in plain language. \
    Answer concisely and never invent project data.";

// Entities the reply can render as a card when several come back at once.
const CARD_COLLECTIONS: [(&str, &str); 4] = [
    ("projects", "Projects"),
    ("tasks", "Tasks"),
    ("tasklists", "Task Lists"),
    ("timelogs", "Time Logs"),
];

const CARD_ENTRY_LIMIT: usize = 10;

/// One finished turn: a text answer, optionally upgraded to a card when the
/// turn produced a multi-entity listing.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub card: Option<Card>,
}

struct ExecutedCall {
    name: String,
    result: OperationResult,
}

/// Drives one utterance through the reason-act loop.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    client: Arc<ProjectsClient>,
    registry: OperationRegistry,
    sessions: SessionStore,
    max_iterations: u32,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        client: Arc<ProjectsClient>,
        registry: OperationRegistry,
        config: &AgentConfig,
    ) -> Self {
        Self {
            llm,
            client,
            registry,
            sessions: SessionStore::new(config.history_cap, config.session_idle_secs),
            max_iterations: config.max_iterations.max(1),
        }
    }

    /// Runs one turn for the given session. Locking the session handle for
    /// the whole turn serializes turns within a session while distinct
    /// sessions proceed in parallel.
    pub async fn submit_utterance(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<TurnReply, TurnError> {
        let correlation_id = Uuid::new_v4();
        debug!(
            event_name = "agent.turn.received",
            session_id,
            correlation_id = %correlation_id,
        );

        let handle = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;

        if session.history().is_empty() {
            session.push(Message::system(SYSTEM_PROMPT));
        }
        session.push(Message::user(text));

        let tools = self.registry.schemas();
        let mut executed: Vec<ExecutedCall> = Vec::new();

        for iteration in 0..self.max_iterations {
            let decision = self
                .llm
                .decide(session.history(), &tools)
                .await
                .map_err(|error| TurnError::Llm(error.to_string()))?;

            match decision {
                Decision::Final(answer) => {
                    session.push(Message::assistant(answer.clone()));
                    let card = render_card(&answer, &executed);
                    info!(
                        event_name = "agent.turn.completed",
                        session_id,
                        correlation_id = %correlation_id,
                        iterations = iteration + 1,
                        operations = executed.len(),
                        carded = card.is_some(),
                    );
                    return Ok(TurnReply { text: answer, card });
                }
                Decision::Invoke(calls) => {
                    session.push(Message::assistant_with_tool_calls(calls.clone()));
                    // Every call id must get a tool reply even when the turn
                    // ends structurally; an assistant message with unanswered
                    // tool calls is rejected by the completions endpoint when
                    // the session is replayed on the next turn.
                    let mut structural: Option<TurnError> = None;
                    for call in calls {
                        if structural.is_some() {
                            let skipped = OperationResult::Failure {
                                kind: FailureKind::Transient,
                                message: "not executed; an earlier call ended the turn"
                                    .to_string(),
                                retry_after_secs: None,
                            };
                            session.push(Message::tool(call.id, skipped.to_message()));
                            continue;
                        }

                        let Some(operation) = self.registry.resolve(&call.name) else {
                            warn!(
                                event_name = "agent.turn.unknown_operation",
                                session_id,
                                operation = %call.name,
                            );
                            let failure = OperationResult::Failure {
                                kind: FailureKind::UnknownOperation,
                                message: format!("'{}' is not a registered operation", call.name),
                                retry_after_secs: None,
                            };
                            session.push(Message::tool(call.id.clone(), failure.to_message()));
                            structural = Some(TurnError::UnknownOperation(call.name));
                            continue;
                        };

                        let result = match operation.spec().validate_args(&call.arguments) {
                            Err(message) => OperationResult::validation(message),
                            Ok(()) => operation.invoke(&call.arguments, &self.client).await,
                        };

                        debug!(
                            event_name = "agent.turn.operation_executed",
                            session_id,
                            correlation_id = %correlation_id,
                            operation = %call.name,
                            ok = matches!(result, OperationResult::Success { .. }),
                        );
                        session.push(Message::tool(call.id.clone(), result.to_message()));

                        // Credential failures cannot be corrected by the
                        // model; everything else loops back as data.
                        if matches!(
                            &result,
                            OperationResult::Failure { kind: FailureKind::Auth, .. }
                        ) {
                            structural = Some(TurnError::Auth);
                            continue;
                        }

                        executed.push(ExecutedCall { name: call.name, result });
                    }
                    if let Some(error) = structural {
                        return Err(error);
                    }
                }
            }
        }

        warn!(
            event_name = "agent.turn.iteration_limit",
            session_id,
            max_iterations = self.max_iterations,
            operations = executed.len(),
        );
        Err(TurnError::IterationLimit { summary: summarize_progress(&executed) })
    }

    pub fn catalog(&self) -> Vec<OperationSpec> {
        self.registry.catalog()
    }

    pub async fn clear_session(&self, session_id: &str) {
        self.sessions.clear(session_id).await;
    }

    pub async fn evict_idle_sessions(&self) -> usize {
        self.sessions.evict_idle().await
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

fn summarize_progress(executed: &[ExecutedCall]) -> String {
    if executed.is_empty() {
        return "I could not work out which operations would answer that. \
                Please rephrase the request or name the project or task directly."
            .to_string();
    }

    let mut names: Vec<&str> = Vec::new();
    for call in executed {
        if !names.contains(&call.name.as_str()) {
            names.push(&call.name);
        }
    }
    format!(
        "I ran {} operation(s) ({}) but could not reach a final answer. \
         Please try a narrower request.",
        executed.len(),
        names.join(", ")
    )
}

/// Upgrades the answer to a card when the turn's most recent successful
/// listing carried at least two entities.
fn render_card(answer: &str, executed: &[ExecutedCall]) -> Option<Card> {
    for call in executed.iter().rev() {
        let OperationResult::Success { data } = &call.result else { continue };
        for (key, title) in CARD_COLLECTIONS {
            let Some(entries) = data.get(key).and_then(Value::as_array) else { continue };
            if entries.len() < 2 {
                continue;
            }

            let mut builder = CardBuilder::new(format!("{title} ({})", entries.len()))
                .section(|section| {
                    section.text(answer);
                });
            builder = builder.section(|section| {
                for entry in entries.iter().take(CARD_ENTRY_LIMIT) {
                    section.text(entity_line(entry));
                }
                if entries.len() > CARD_ENTRY_LIMIT {
                    section.text(format!("... and {} more", entries.len() - CARD_ENTRY_LIMIT));
                }
            });
            return Some(builder.build());
        }
    }
    None
}

fn entity_line(entry: &Value) -> String {
    let id = entry.get("id").and_then(Value::as_str).unwrap_or("N/A");
    if let Some(name) = entry.get("name").and_then(Value::as_str) {
        return match entry.get("status").and_then(Value::as_str) {
            Some(status) => format!("{name} (ID: {id}) - {status}"),
            None => format!("{name} (ID: {id})"),
        };
    }
    // Time log entries have no name; lead with the logged time instead.
    let hours = entry.get("hours").and_then(Value::as_str).unwrap_or("?");
    let date = entry.get("date").and_then(Value::as_str).unwrap_or("unknown date");
    format!("{hours} on {date} (ID: {id})")
}
