//! Terabox relay bot
//!
//! A Telegram bot that resolves Terabox share links through a third-party
//! API and relays the described files back to the requesting user, with a
//! membership gate, per-user throttling and an optional moderation mirror.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// Resolver API client
pub mod resolver;
