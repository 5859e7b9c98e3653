//! "More or less" guessing game.
//!
//! The bot picks a secret number; players guess and are told whether the
//! secret is higher or lower. One game is shared by everyone.

use rand::Rng;

pub const LOWEST: i64 = 1;
pub const HIGHEST: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The secret is higher than the guess.
    More,
    /// The secret is lower than the guess.
    Less,
    /// Found it; a new round has already started.
    Correct { steps: u32 },
    /// Missing or non-numeric argument. Does not count as a step.
    BadSyntax,
}

#[derive(Debug)]
pub struct GuessGame {
    secret: i64,
    steps: u32,
}

impl Default for GuessGame {
    fn default() -> Self {
        Self::new()
    }
}

impl GuessGame {
    pub fn new() -> Self {
        Self::with_secret(draw())
    }

    pub fn with_secret(secret: i64) -> Self {
        Self { secret, steps: 0 }
    }

    pub fn secret(&self) -> i64 {
        self.secret
    }

    /// Valid guesses made so far in this round.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn guess(&mut self, arg: Option<&str>) -> Outcome {
        let Some(guess) = arg.and_then(|a| a.parse::<i64>().ok()) else {
            return Outcome::BadSyntax;
        };
        self.steps += 1;
        match guess.cmp(&self.secret) {
            std::cmp::Ordering::Less => Outcome::More,
            std::cmp::Ordering::Greater => Outcome::Less,
            std::cmp::Ordering::Equal => {
                let steps = self.steps;
                *self = Self::new();
                Outcome::Correct { steps }
            }
        }
    }
}

fn draw() -> i64 {
    rand::thread_rng().gen_range(LOWEST..=HIGHEST)
}

/// Chat reply for an outcome. `prefix` is the bot's command prefix.
pub fn render(outcome: Outcome, nick: &str, prefix: &str) -> String {
    match outcome {
        Outcome::More => "It is more!".to_string(),
        Outcome::Less => "It is less!".to_string(),
        Outcome::Correct { steps } => {
            format!("{nick} guessed the correct answer! (it took {steps} guesses)")
        }
        Outcome::BadSyntax => format!("Syntax is: \"{prefix}guess <number>\""),
    }
}
