//! ircbot-sdk: async IRC client for bots.
//!
//! - [`client`]: connection, registration, keepalive and reconnect
//! - [`event`]: what the client reports back
//! - [`irc`]: wire-format parsing and CTCP helpers
//! - [`bot`]: prefix-command dispatch on top of the event stream

pub mod bot;
pub mod client;
pub mod event;
pub mod irc;
