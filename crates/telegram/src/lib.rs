//! Telegram boundary for the crosspost bot.
//!
//! Receives updates via a manual long-polling loop, decodes callback tokens
//! into typed actions, renders outcomes of the exchange engine as messages
//! and inline keyboards, and implements the engine's `PostGateway` seam on
//! the Telegram Bot API.

pub mod access;
pub mod admin;
pub mod bot;
pub mod callback;
pub mod config;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

pub use {bot::start_polling, config::BotConfig, error::Error};
