//! ircbot: a small IRC bot that keeps channels company.
//!
//! Joins the configured channels and answers `!hello`, `!info`, `!guess`
//! and `!help`. Connection handling lives in `ircbot-sdk`.

pub mod commands;
pub mod config;

use ircbot_sdk::bot::Bot;

use crate::config::Config;

/// Reply to CTCP VERSION.
pub const VERSION: &str = concat!("ircbot v", env!("CARGO_PKG_VERSION"));

/// Build the command bot for a loaded configuration.
pub fn build_bot(config: &Config) -> Bot {
    let mut bot = Bot::new(&config.command_prefix, &config.nickname).version(VERSION);
    commands::register(&mut bot);
    bot
}
