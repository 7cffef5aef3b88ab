//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod catalog;
pub mod config_cmd;
pub mod control;
pub mod deck;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

/// Dispatch a Miniserver-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config_or_default();
    match cmd {
        Command::Catalog(args) => catalog::handle(args, &cfg, global).await,
        Command::Send(args) => control::send(args, &cfg, global).await,
        Command::Press(args) => control::press(args, &cfg, global).await,
        Command::Rotate(args) => control::rotate(args, &cfg, global).await,
        Command::Deck => deck::handle(&cfg, global).await,
        Command::Watch(args) => watch::handle(args, &cfg, global).await,
        // Handled before dispatch
        Command::Config(_) | Command::Completions(_) | Command::Serve(_) => Ok(()),
    }
}
