//! Cliq channel adapter.
//!
//! `inbound` decides whether a webhook event is addressed to the bot and
//! extracts the utterance; `outbound` shapes turn results into the reply
//! payload, which carries either plain text or a card, never both.

pub mod inbound;
pub mod outbound;
