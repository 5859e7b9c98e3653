//! Chat commands: `hello`, `info` and `guess`.

pub mod guess;

use std::sync::Arc;

use ircbot_sdk::bot::Bot;
use tokio::sync::Mutex;

use guess::GuessGame;

pub const HELLO_HELP: &str = "Prints a welcoming message";
pub const INFO_HELP: &str = "Prints bot information";
pub const GUESS_HELP: &str = "Play a \"more or less\" game";

/// Reply to `info`.
pub const INFO: &str = concat!(
    "I am a bot! Check out my code at ",
    env!("CARGO_PKG_REPOSITORY"),
    "."
);

pub fn hello(nick: &str) -> String {
    format!("Hello {nick}!")
}

/// Register every command with a freshly drawn game.
pub fn register(bot: &mut Bot) {
    register_with_game(bot, Arc::new(Mutex::new(GuessGame::new())));
}

/// Register every command, sharing `game` between all `guess` callers.
pub fn register_with_game(bot: &mut Bot, game: Arc<Mutex<GuessGame>>) {
    bot.command("hello", HELLO_HELP, |ctx| async move {
        Ok(Some(hello(&ctx.sender)))
    });

    bot.command("info", INFO_HELP, |_ctx| async move { Ok(Some(INFO.to_string())) });

    let prefix = bot.prefix().to_string();
    bot.command("guess", GUESS_HELP, move |ctx| {
        let game = game.clone();
        let prefix = prefix.clone();
        async move {
            let outcome = game.lock().await.guess(ctx.arg(0));
            if let guess::Outcome::Correct { steps } = outcome {
                tracing::info!(winner = %ctx.sender, steps, "Guessing game won");
            }
            Ok(Some(guess::render(outcome, &ctx.sender, &prefix)))
        }
    });
}
