//! ircbot: connects to one IRC server, joins channels and answers commands.
//!
//!   !hello           greets the caller
//!   !info            where the code lives
//!   !guess <number>  higher/lower game
//!   !help            list commands
//!
//! Usage: `ircbot [-c config.json]`; `IRCBOT_CONFIG` also sets the path.
//! Logging follows `RUST_LOG`;
//! set `IRCBOT_LOG_JSON=1` for JSON lines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ircbot_sdk::bot::Bot;
use ircbot_sdk::client::{self, ClientHandle};
use ircbot_sdk::event::Event;
use tracing_subscriber::EnvFilter;

use ircbot::config::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "ircbot", version, about = "IRC bot with a few chat commands")]
struct Args {
    /// Configuration file (JSON)
    #[arg(short = 'c', long = "config", env = "IRCBOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn init_logging() {
    let json_logs = std::env::var("IRCBOT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ircbot=info,ircbot_sdk=info"));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    tracing::warn!("Loading configuration from {}", args.config.display());
    let config = Config::load(&args.config)?;

    tracing::info!(
        nick = %config.nickname,
        channels = config.channels.len(),
        "Connecting to IRC server {}",
        config.server_addr()
    );

    let bot = Arc::new(ircbot::build_bot(&config));

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested by console."),
            Err(e) => {
                tracing::error!(error = %e, "Can't listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    client::run_with_reconnect(
        config.connect_config(),
        config.reconnect_config(),
        shutdown,
        move |handle: ClientHandle, event: Event| {
            let bot = bot.clone();
            Box::pin(async move {
                log_event(&bot, &event);
                bot.handle_event(&handle, &event).await;
                Ok(())
            })
        },
    )
    .await?;

    tracing::info!("Bye");
    Ok(())
}

fn log_event(bot: &Bot, event: &Event) {
    match event {
        Event::Registered { nick } => tracing::info!("Registered as {nick}"),
        Event::Joined { channel, nick } if nick.eq_ignore_ascii_case(&bot.nick()) => {
            tracing::info!("Joined IRC channel: {channel}");
        }
        Event::Kicked { channel, nick, by, reason } if nick.eq_ignore_ascii_case(&bot.nick()) => {
            tracing::warn!(by = %by, reason = %reason, "Kicked from {channel}");
        }
        Event::JoinFailed { channel, code: 475, .. } => {
            tracing::info!("Cannot join channel {channel} (bad key).");
        }
        Event::JoinFailed { channel, code, reason } => {
            tracing::warn!(code, "Cannot join channel {channel}: {reason}");
        }
        Event::NickInUse { attempted, retry } => {
            tracing::info!("Nickname {attempted} is in use, trying {retry}");
        }
        Event::Notice { from, text, .. } => tracing::debug!("Notice from {from}: {text}"),
        Event::ServerNotice { text } => tracing::debug!("Server: {text}"),
        Event::Disconnected { reason, requested: false } => tracing::warn!("Disconnected: {reason}"),
        Event::Disconnected { reason, requested: true } => tracing::info!("Disconnected: {reason}"),
        _ => {}
    }
}
