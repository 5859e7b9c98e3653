//! Command-dispatch framework for chat bots.
//!
//! A [`Bot`] owns a set of named commands. Feed it every [`Event`] from the
//! client; messages that start with the command prefix are routed to the
//! matching handler and the handler's reply is sent back to the channel (or
//! to the sender, for private messages). `<prefix>help` is built in.
//!
//! ```rust,no_run
//! use ircbot_sdk::bot::Bot;
//!
//! let mut bot = Bot::new("!", "ircbot");
//! bot.command("ping", "Check if the bot is alive", |_ctx| async move {
//!     Ok(Some("pong!".to_string()))
//! });
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;

use crate::client::ClientHandle;
use crate::event::Event;
use crate::irc::{self, Ctcp};

/// What a command handler resolves to: an optional one- or multi-line reply.
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>;

type Handler = Arc<dyn Fn(CommandContext) -> CommandFuture + Send + Sync>;

struct RegisteredCommand {
    help: String,
    handler: Handler,
}

/// A parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Nick of the user who sent the command.
    pub sender: String,
    /// Where the message was sent: a channel, or our own nick.
    pub target: String,
    /// Where replies go: the channel, or the sender for private messages.
    pub reply_target: String,
    /// Command name without the prefix.
    pub command: String,
    /// Whitespace-separated arguments.
    pub args: Vec<String>,
    /// Everything after the command name, trimmed.
    pub args_raw: String,
}

impl CommandContext {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }

    pub fn is_private(&self) -> bool {
        !irc::is_channel(&self.target)
    }
}

pub struct Bot {
    prefix: String,
    nick: RwLock<String>,
    version: String,
    line_delay: Duration,
    commands: BTreeMap<String, RegisteredCommand>,
}

impl Bot {
    pub fn new(prefix: &str, nick: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            nick: RwLock::new(nick.to_string()),
            version: concat!("ircbot-sdk ", env!("CARGO_PKG_VERSION")).to_string(),
            line_delay: Duration::from_millis(80),
            commands: BTreeMap::new(),
        }
    }

    /// Text returned to CTCP VERSION requests.
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Pause between lines of a multi-line reply, to stay under flood limits.
    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Our current nick, as confirmed by the server.
    pub fn nick(&self) -> String {
        self.nick.read().clone()
    }

    /// Register a command. A second registration under the same name wins.
    pub fn command<F, Fut>(&mut self, name: &str, help: &str, handler: F)
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        let boxed: Handler =
            Arc::new(move |ctx: CommandContext| -> CommandFuture { Box::pin(handler(ctx)) });
        self.commands.insert(
            name.to_string(),
            RegisteredCommand {
                help: help.to_string(),
                handler: boxed,
            },
        );
    }

    /// One `<prefix><name>: <help>` line per command, sorted by name.
    pub fn help_lines(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|(name, cmd)| format!("{}{}: {}", self.prefix, name, cmd.help))
            .collect()
    }

    /// Split a chat line into a command invocation, if it is one.
    pub fn parse(&self, sender: &str, target: &str, text: &str) -> Option<CommandContext> {
        let body = text.strip_prefix(self.prefix.as_str())?;
        let (command, rest) = match body.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r),
            None => (body, ""),
        };
        if command.is_empty() {
            return None;
        }
        let args_raw = rest.trim().to_string();
        let reply_target = if irc::is_channel(target) { target } else { sender };
        Some(CommandContext {
            sender: sender.to_string(),
            target: target.to_string(),
            reply_target: reply_target.to_string(),
            command: command.to_string(),
            args: args_raw.split_whitespace().map(String::from).collect(),
            args_raw,
        })
    }

    /// Run the handler for a parsed invocation and collect reply lines.
    pub async fn run(&self, ctx: CommandContext) -> Vec<String> {
        if ctx.command == "help" {
            return self.help_lines();
        }
        let Some(cmd) = self.commands.get(&ctx.command) else {
            return Vec::new();
        };

        let command = ctx.command.clone();
        let sender = ctx.sender.clone();
        match (cmd.handler)(ctx).await {
            Ok(Some(reply)) => reply
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(String::from)
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(command = %command, sender = %sender, error = %format!("{e:#}"), "Command failed");
                vec![format!("Error: {e}")]
            }
        }
    }

    /// Parse and run in one step. Non-commands yield no lines.
    pub async fn dispatch(&self, sender: &str, target: &str, text: &str) -> Vec<String> {
        match self.parse(sender, target, text) {
            Some(ctx) => self.run(ctx).await,
            None => Vec::new(),
        }
    }

    /// React to a client event: track our nick, answer commands and CTCP.
    pub async fn handle_event(&self, handle: &ClientHandle, event: &Event) {
        match event {
            Event::Registered { nick } => {
                *self.nick.write() = nick.clone();
            }
            Event::NickChanged { old_nick, new_nick } => {
                let mut nick = self.nick.write();
                if nick.eq_ignore_ascii_case(old_nick) {
                    *nick = new_nick.clone();
                }
            }
            Event::Message { from, target, text, .. } => {
                if from.eq_ignore_ascii_case(&self.nick()) {
                    return;
                }
                let Some(ctx) = self.parse(from, target, text) else {
                    return;
                };
                tracing::debug!(command = %ctx.command, sender = %from, target = %target, "Command");
                let reply_target = ctx.reply_target.clone();
                let lines = self.run(ctx).await;
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 && !self.line_delay.is_zero() {
                        tokio::time::sleep(self.line_delay).await;
                    }
                    if let Err(e) = handle.privmsg(&reply_target, line).await {
                        tracing::warn!(error = %e, "Reply not sent");
                        break;
                    }
                }
            }
            // Never answer a NOTICE, or two bots can talk forever.
            Event::Notice { .. } => {}
            Event::Ctcp { from, command, args, .. } => {
                let reply = match command.as_str() {
                    "VERSION" => Some(Ctcp::format("VERSION", &self.version)),
                    "PING" => Some(Ctcp::format("PING", args)),
                    _ => None,
                };
                if let Some(reply) = reply {
                    tracing::debug!(from = %from, ctcp = %command, "CTCP reply");
                    if let Err(e) = handle.notice(from, &reply).await {
                        tracing::warn!(error = %e, "CTCP reply not sent");
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Command;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn echo_bot() -> Bot {
        let mut bot = Bot::new("!", "bot").line_delay(Duration::ZERO);
        bot.command("echo", "Echo your message back", |ctx| async move {
            Ok(Some(ctx.args_raw))
        });
        bot.command("quiet", "Never says anything", |_ctx| async move { Ok(None) });
        bot.command("fail", "Always fails", |_ctx| async move {
            Err(anyhow::anyhow!("boom"))
        });
        bot
    }

    fn message(from: &str, target: &str, text: &str) -> Event {
        Event::Message {
            from: from.into(),
            target: target.into(),
            text: text.into(),
            tags: HashMap::new(),
        }
    }

    #[test]
    fn parse_splits_command_and_args() {
        let bot = echo_bot();
        let ctx = bot.parse("alice", "#rust", "!guess   42  extra").unwrap();
        assert_eq!(ctx.command, "guess");
        assert_eq!(ctx.args, vec!["42", "extra"]);
        assert_eq!(ctx.args_raw, "42  extra");
        assert_eq!(ctx.arg(0), Some("42"));
        assert_eq!(ctx.reply_target, "#rust");
        assert!(!ctx.is_private());
    }

    #[test]
    fn parse_ignores_non_commands() {
        let bot = echo_bot();
        assert!(bot.parse("alice", "#rust", "hello !echo").is_none());
        assert!(bot.parse("alice", "#rust", "!").is_none());
        assert!(bot.parse("alice", "#rust", "! echo").is_none());
    }

    #[test]
    fn private_messages_reply_to_sender() {
        let bot = echo_bot();
        let ctx = bot.parse("alice", "bot", "!echo hi").unwrap();
        assert!(ctx.is_private());
        assert_eq!(ctx.reply_target, "alice");
    }

    #[test]
    fn help_is_sorted_by_name() {
        let bot = echo_bot();
        assert_eq!(
            bot.help_lines(),
            vec![
                "!echo: Echo your message back",
                "!fail: Always fails",
                "!quiet: Never says anything",
            ]
        );
    }

    #[tokio::test]
    async fn dispatch_routes_to_handlers() {
        let bot = echo_bot();
        assert_eq!(bot.dispatch("alice", "#c", "!echo hi there").await, vec!["hi there"]);
        assert!(bot.dispatch("alice", "#c", "!quiet").await.is_empty());
        assert!(bot.dispatch("alice", "#c", "!unknown").await.is_empty());
        assert!(bot.dispatch("alice", "#c", "!ECHO case matters").await.is_empty());
        assert_eq!(bot.dispatch("alice", "#c", "!help").await.len(), 3);
        assert_eq!(bot.dispatch("alice", "#c", "!fail").await, vec!["Error: boom"]);
    }

    #[tokio::test]
    async fn reregistering_replaces_handler() {
        let mut bot = echo_bot();
        bot.command("echo", "Shout", |ctx| async move {
            Ok(Some(ctx.args_raw.to_uppercase()))
        });
        assert_eq!(bot.dispatch("a", "#c", "!echo hi").await, vec!["HI"]);
        assert_eq!(bot.help_lines()[0], "!echo: Shout");
    }

    #[tokio::test]
    async fn multi_line_replies_are_split() {
        let mut bot = Bot::new("!", "bot").line_delay(Duration::ZERO);
        bot.command("two", "Two lines", |_ctx| async move {
            Ok(Some("first\n\nsecond".to_string()))
        });
        assert_eq!(bot.dispatch("a", "#c", "!two").await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn handle_event_replies_through_client() {
        let bot = echo_bot();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::new(tx);

        bot.handle_event(&handle, &message("alice", "#rust", "!echo hi")).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Privmsg { target: "#rust".into(), text: "hi".into() }
        );

        bot.handle_event(&handle, &message("alice", "bot", "!echo psst")).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Privmsg { target: "alice".into(), text: "psst".into() }
        );
    }

    #[tokio::test]
    async fn notices_never_trigger_commands() {
        let bot = echo_bot();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::new(tx);

        let notice = Event::Notice {
            from: "otherbot".into(),
            target: "bot".into(),
            text: "!echo loop".into(),
        };
        bot.handle_event(&handle, &notice).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn own_messages_are_ignored_after_nick_change() {
        let bot = echo_bot();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::new(tx);

        bot.handle_event(&handle, &Event::Registered { nick: "bot_".into() }).await;
        assert_eq!(bot.nick(), "bot_");
        bot.handle_event(&handle, &Event::NickChanged { old_nick: "bot_".into(), new_nick: "bot".into() })
            .await;
        assert_eq!(bot.nick(), "bot");
        bot.handle_event(&handle, &Event::NickChanged { old_nick: "carol".into(), new_nick: "dave".into() })
            .await;
        assert_eq!(bot.nick(), "bot");

        bot.handle_event(&handle, &message("bot", "#rust", "!echo loop")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ctcp_version_and_ping_are_answered() {
        let bot = echo_bot().version("ircbot 1.0");
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::new(tx);

        let ctcp = |command: &str, args: &str| Event::Ctcp {
            from: "alice".into(),
            target: "bot".into(),
            command: command.into(),
            args: args.into(),
        };

        bot.handle_event(&handle, &ctcp("VERSION", "")).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Notice { target: "alice".into(), text: "\x01VERSION ircbot 1.0\x01".into() }
        );

        bot.handle_event(&handle, &ctcp("PING", "123")).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Notice { target: "alice".into(), text: "\x01PING 123\x01".into() }
        );

        bot.handle_event(&handle, &ctcp("ACTION", "waves")).await;
        assert!(rx.try_recv().is_err());
    }
}
