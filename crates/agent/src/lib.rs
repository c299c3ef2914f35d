//! Turn orchestration.
//!
//! A turn takes one user utterance, loops the reasoning function against the
//! operation registry, and produces either a text answer or a card. Business
//! failures flow back to the model as data; only structural failures
//! (authentication, unknown operation, reasoning outage, iteration limit)
//! abort the turn.

pub mod llm;
pub mod openai;
pub mod operations;
pub mod runtime;
pub mod tools;

#[cfg(test)]
pub(crate) mod testutil;
