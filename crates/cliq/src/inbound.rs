use projbot_core::config::CliqConfig;
use serde::Deserialize;
use tracing::debug;

/// Webhook payload from the chat platform. Unknown fields are ignored so
/// platform additions never break parsing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: EventUser,
    #[serde(default)]
    pub chat: EventChat,
    #[serde(default)]
    pub mentions: Vec<EventMention>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventChat {
    #[serde(default)]
    pub id: String,
    /// "direct", "bot" or "channel".
    #[serde(default, rename = "type")]
    pub chat_type: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventMention {
    #[serde(default, rename = "type")]
    pub mention_type: String,
}

/// Where an inbound event goes after normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    /// Hand the utterance to the orchestrator under this session.
    Turn { session_id: String, text: String },
    /// Addressed but empty after stripping the mention; show usage.
    Help,
    /// Silently ignored.
    Drop(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    FromBot,
    EmptyText,
    NotAddressed,
}

/// Decides whether an event is addressed to the bot and extracts the
/// utterance. Addressing requires a direct or bot conversation, or a
/// structured bot mention; free-text alias matches deep in a message do
/// not count, aliases are only stripped from the head.
pub struct Normalizer {
    aliases: Vec<String>,
}

impl Normalizer {
    pub fn new(config: &CliqConfig) -> Self {
        let mut aliases: Vec<String> =
            config.bot_aliases.iter().map(|alias| alias.to_lowercase()).collect();
        // Longest first so "@projbot" wins over "projbot".
        aliases.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { aliases }
    }

    pub fn route(&self, event: &InboundEvent) -> Routed {
        if event.user.is_bot {
            return Routed::Drop(DropReason::FromBot);
        }
        if event.text.trim().is_empty() {
            return Routed::Drop(DropReason::EmptyText);
        }

        let direct = matches!(event.chat.chat_type.as_str(), "direct" | "bot");
        let mentioned = event.mentions.iter().any(|mention| mention.mention_type == "bot")
            || self.head_alias_len(event.text.trim()).is_some();
        if !direct && !mentioned {
            debug!(event_name = "cliq.inbound.not_addressed", chat_id = %event.chat.id);
            return Routed::Drop(DropReason::NotAddressed);
        }

        let text = self.strip_head_alias(event.text.trim());
        if text.is_empty() {
            return Routed::Help;
        }

        Routed::Turn { session_id: self.session_id(event), text }
    }

    /// One session per conversation; a user id fallback keeps direct chats
    /// without a chat id from sharing history.
    fn session_id(&self, event: &InboundEvent) -> String {
        if !event.chat.id.is_empty() {
            event.chat.id.clone()
        } else {
            format!("user-{}", event.user.id)
        }
    }

    fn head_alias_len(&self, text: &str) -> Option<usize> {
        let lower = text.to_lowercase();
        self.aliases.iter().find(|alias| lower.starts_with(alias.as_str())).map(|a| a.len())
    }

    fn strip_head_alias(&self, text: &str) -> String {
        match self.head_alias_len(text) {
            Some(len) => text[len..].trim_start_matches([':', ',']).trim().to_string(),
            None => text.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use projbot_core::config::CliqConfig;
    use serde_json::json;

    use super::{DropReason, InboundEvent, Normalizer, Routed};

    fn normalizer() -> Normalizer {
        Normalizer::new(&CliqConfig {
            bot_aliases: vec!["@projbot".to_string(), "projbot".to_string()],
        })
    }

    fn event(value: serde_json::Value) -> InboundEvent {
        serde_json::from_value(value).expect("event parses")
    }

    #[test]
    fn direct_chats_need_no_mention() {
        let routed = normalizer().route(&event(json!({
            "text": "show me the q3 projects",
            "user": { "id": "u1", "name": "Ada" },
            "chat": { "id": "c1", "type": "direct" }
        })));

        assert_eq!(
            routed,
            Routed::Turn { session_id: "c1".into(), text: "show me the q3 projects".into() }
        );
    }

    #[test]
    fn channel_messages_require_a_mention() {
        let normalizer = normalizer();

        let unaddressed = normalizer.route(&event(json!({
            "text": "lunch anyone?",
            "user": { "id": "u1" },
            "chat": { "id": "c1", "type": "channel" }
        })));
        assert_eq!(unaddressed, Routed::Drop(DropReason::NotAddressed));

        let mentioned = normalizer.route(&event(json!({
            "text": "@projbot list open tasks in Marketing",
            "user": { "id": "u1" },
            "chat": { "id": "c1", "type": "channel" },
            "mentions": [{ "type": "bot" }]
        })));
        assert_eq!(
            mentioned,
            Routed::Turn { session_id: "c1".into(), text: "list open tasks in Marketing".into() }
        );
    }

    #[test]
    fn a_bare_mention_asks_for_help() {
        let routed = normalizer().route(&event(json!({
            "text": "@projbot",
            "user": { "id": "u1" },
            "chat": { "id": "c1", "type": "channel" },
            "mentions": [{ "type": "bot" }]
        })));

        assert_eq!(routed, Routed::Help);
    }

    #[test]
    fn head_aliases_are_stripped_case_insensitively() {
        let routed = normalizer().route(&event(json!({
            "text": "ProjBot: create a task called Review",
            "user": { "id": "u1" },
            "chat": { "id": "c1", "type": "direct" }
        })));

        assert_eq!(
            routed,
            Routed::Turn { session_id: "c1".into(), text: "create a task called Review".into() }
        );
    }

    #[test]
    fn aliases_deep_in_a_message_do_not_address_the_bot() {
        let routed = normalizer().route(&event(json!({
            "text": "someone should ask projbot about this",
            "user": { "id": "u1" },
            "chat": { "id": "c1", "type": "channel" }
        })));

        assert_eq!(routed, Routed::Drop(DropReason::NotAddressed));
    }

    #[test]
    fn bot_messages_and_empty_texts_are_dropped() {
        let normalizer = normalizer();

        let from_bot = normalizer.route(&event(json!({
            "text": "I am also a bot",
            "user": { "id": "b1", "is_bot": true },
            "chat": { "id": "c1", "type": "direct" }
        })));
        assert_eq!(from_bot, Routed::Drop(DropReason::FromBot));

        let empty = normalizer.route(&event(json!({
            "text": "   ",
            "user": { "id": "u1" },
            "chat": { "id": "c1", "type": "direct" }
        })));
        assert_eq!(empty, Routed::Drop(DropReason::EmptyText));
    }

    #[test]
    fn chats_without_an_id_fall_back_to_the_user() {
        let routed = normalizer().route(&event(json!({
            "text": "hello",
            "user": { "id": "u42" },
            "chat": { "type": "bot" }
        })));

        assert_eq!(routed, Routed::Turn { session_id: "user-u42".into(), text: "hello".into() });
    }
}
