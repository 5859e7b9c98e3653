//! Events emitted by the IRC client for the consumer (bot, logger, etc.)

use std::collections::HashMap;

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Transport is up; registration has not finished yet.
    Connected,

    /// IRC registration complete. `nick` is our confirmed nick.
    Registered {
        nick: String,
    },

    /// Someone (possibly us) joined a channel.
    Joined {
        channel: String,
        nick: String,
    },

    /// Someone left a channel.
    Parted {
        channel: String,
        nick: String,
    },

    /// Someone was kicked from a channel.
    Kicked {
        channel: String,
        nick: String,
        by: String,
        reason: String,
    },

    /// The server refused a JOIN (bad key, invite only, banned, full...).
    JoinFailed {
        channel: String,
        code: u16,
        reason: String,
    },

    /// Our nick was taken during registration; `retry` is being tried next.
    NickInUse {
        attempted: String,
        retry: String,
    },

    /// A user changed nick.
    NickChanged {
        old_nick: String,
        new_nick: String,
    },

    /// A message in a channel or a private message.
    Message {
        from: String,
        target: String,
        text: String,
        /// IRCv3 message tags (empty if none).
        tags: HashMap<String, String>,
    },

    /// A NOTICE from a user. Bots must never answer these automatically.
    Notice {
        from: String,
        target: String,
        text: String,
    },

    /// A CTCP request (VERSION, PING, ACTION...) addressed to a channel or to us.
    Ctcp {
        from: String,
        target: String,
        command: String,
        args: String,
    },

    /// Server sent an error or notice.
    ServerNotice {
        text: String,
    },

    /// Someone quit the server.
    UserQuit {
        nick: String,
        reason: String,
    },

    /// Connection was closed. `requested` is true when we sent QUIT ourselves.
    Disconnected {
        reason: String,
        requested: bool,
    },

    /// Raw server line (for debugging).
    RawLine(String),
}
