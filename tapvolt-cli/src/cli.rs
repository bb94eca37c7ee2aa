//! Command-line argument parsing for the tapvolt client
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};

use tapvolt_protocol::Step;

/// tapvolt - remote control client for a desktop automation host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Desktop host address (host:port, or a full ws:// / wss:// URL)
    ///
    /// Falls back to the address remembered from the previous run.
    #[arg(long, short = 'a', env = "TAPVOLT_ADDR")]
    pub address: Option<String>,

    /// Logical client name presented during authentication
    #[arg(long, default_value = "tapvolt-cli")]
    pub name: String,

    /// How long to wait for the action result, in seconds
    #[arg(long, default_value_t = 10)]
    pub wait: u64,

    #[command(subcommand)]
    pub action: ActionCommand,
}

/// One desktop action to run
#[derive(Subcommand, Debug)]
pub enum ActionCommand {
    /// Type a string on the desktop
    Text { value: String },

    /// Press a single key
    Key { key: String },

    /// Press a keyboard shortcut, e.g. `shortcut control s`
    Shortcut {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Pause for a number of milliseconds
    Delay { millis: f64 },

    /// Run a shell command line on the desktop
    Command { line: String },
}

impl ActionCommand {
    /// Converts to the wire step shape.
    pub fn to_step(&self) -> Step {
        match self {
            Self::Text { value } => Step::Text {
                value: value.clone(),
            },
            Self::Key { key } => Step::Key { key: key.clone() },
            Self::Shortcut { keys } => Step::Shortcut { keys: keys.clone() },
            Self::Delay { millis } => Step::Delay { duration: *millis },
            Self::Command { line } => Step::Command {
                command: line.clone(),
            },
        }
    }
}
