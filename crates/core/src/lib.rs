//! Core domain types for projbot.
//!
//! This crate holds everything the rest of the workspace agrees on:
//! - `config` - layered application configuration (file, env, overrides)
//! - `errors` - the backend and turn-level error taxonomy
//! - `session` - per-conversation message history with bounded retention
//! - `card` - the generic structured-card payload rendered into chat
//!
//! Nothing in here performs I/O except the config loader reading its TOML
//! file; HTTP, LLM, and channel concerns live in the sibling crates.

pub mod card;
pub mod config;
pub mod errors;
pub mod session;
