use projbot_agent::runtime::TurnReply;
use projbot_agent::tools::OperationSpec;
use projbot_core::card::{Card, CardBuilder};
use projbot_core::errors::TurnError;
use serde::Serialize;

/// Reply payload for the webhook. Exactly one of `text` and `card` is set;
/// the constructors are the only way to build one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CliqResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card: Option<Card>,
}

impl CliqResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), card: None }
    }

    pub fn card(card: Card) -> Self {
        Self { text: None, card: Some(card) }
    }

    /// Acknowledgement with no visible message, used for dropped events.
    pub fn silent() -> Self {
        Self { text: Some(String::new()), card: None }
    }
}

pub fn format_reply(reply: TurnReply) -> CliqResponse {
    match reply.card {
        // The card already leads with the answer text.
        Some(card) => CliqResponse::card(card),
        None => CliqResponse::text(reply.text),
    }
}

pub fn error_reply(error: &TurnError) -> CliqResponse {
    CliqResponse::text(error.user_message())
}

/// Usage card shown for a bare mention: one line per operation.
pub fn help_card(catalog: &[OperationSpec]) -> CliqResponse {
    let card = CardBuilder::new("Projects Assistant")
        .section(|section| {
            section.text(
                "Ask me about your projects in plain language and I will use \
                 these operations on your behalf:",
            );
        })
        .section(|section| {
            for spec in catalog {
                section.text(format!("{} - {}", spec.name, spec.description));
            }
        })
        .build();
    CliqResponse::card(card)
}
