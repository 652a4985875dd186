//! Confchat client runtime.
//!
//! Paced reveal of streamed assistant text and a credential-aware chat
//! socket lifecycle.

pub mod animation;
pub mod bridge;
pub mod config;
pub mod connection;
