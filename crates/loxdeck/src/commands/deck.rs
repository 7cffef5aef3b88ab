//! `deck`: every configured button's poll loop, printed to the terminal.
//!
//! Gestures can be typed on stdin while the deck runs:
//! `press <button>`, `push <button>`, `rotate <button> <ticks>`.

use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use loxdeck_core::{ButtonSurface, Deck, HttpConnector, Indicator, Outcome};

use crate::cli::GlobalOpts;
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Prints title and indicator changes with a timestamp.
struct TerminalSurface {
    button: String,
    color: bool,
    quiet: bool,
}

impl TerminalSurface {
    fn emit(&self, text: &str) {
        if self.quiet {
            return;
        }
        let stamp = Local::now().format("%H:%M:%S").to_string();
        println!("{} {:<16} {text}", output::muted(&stamp, self.color), self.button);
    }
}

impl ButtonSurface for TerminalSurface {
    fn set_title(&self, title: &str) {
        self.emit(&title.replace('\n', " "));
    }

    fn show_indicator(&self, indicator: Indicator) {
        let mark = match indicator {
            Indicator::Ok => output::status_text("ok", true, self.color),
            Indicator::Alert => output::status_text("alert", false, self.color),
        };
        self.emit(&mark);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Gesture<'a> {
    Press(&'a str),
    Push(&'a str),
    Rotate(&'a str, i32),
}

fn parse_gesture(line: &str) -> Option<Gesture<'_>> {
    let mut words = line.split_whitespace();
    let verb = words.next()?;
    let button = words.next()?;
    let gesture = match verb {
        "press" | "p" => Gesture::Press(button),
        "push" => Gesture::Push(button),
        "rotate" | "r" => Gesture::Rotate(button, words.next()?.parse().ok()?),
        _ => return None,
    };
    words.next().is_none().then_some(gesture)
}

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    if cfg.buttons.is_empty() {
        return Err(CliError::NotFound {
            resource_type: "button".into(),
            identifier: "(any)".into(),
            list_command: "config show".into(),
        });
    }

    let color = output::should_color(global.color);
    let deck = Deck::new(Arc::new(HttpConnector));

    for (name, button) in &cfg.buttons {
        let settings = match config::resolve_button(global, cfg, name) {
            Ok((_, settings)) => settings,
            Err(e) => {
                warn!(button = %name, error = %e, "button has no usable connection");
                loxdeck_config::button_config_to_settings(button, None)
            }
        };
        let surface = Arc::new(TerminalSurface {
            button: name.clone(),
            color,
            quiet: global.quiet,
        });
        deck.will_appear(name.clone(), button.kind, settings, surface);
    }

    if !global.quiet {
        eprintln!("{} buttons on deck; Ctrl-C to stop", deck.len());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => run_gesture(&deck, &line).await,
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    debug!("stopping deck");
    deck.clear();
    Ok(())
}

async fn run_gesture(deck: &Deck, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let Some(gesture) = parse_gesture(line) else {
        eprintln!("expected: press <button> | push <button> | rotate <button> <ticks>");
        return;
    };
    let outcome = match gesture {
        Gesture::Press(button) => deck.key_down(button).await,
        Gesture::Push(button) => deck.dial_down(button).await,
        Gesture::Rotate(button, ticks) => deck.dial_rotate(button, ticks).await,
    };
    match outcome {
        Outcome::Accepted { .. } | Outcome::NeedsSetup => {}
        Outcome::Rejected { verb, code } => eprintln!("'{verb}' rejected with code {code}"),
        Outcome::Failed { verb, message } => eprintln!("'{verb}' failed: {message}"),
        Outcome::Ignored => eprintln!("nothing to do"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gestures_parse() {
        assert_eq!(parse_gesture("press kitchen"), Some(Gesture::Press("kitchen")));
        assert_eq!(parse_gesture("push dial"), Some(Gesture::Push("dial")));
        assert_eq!(parse_gesture("r blinds -3"), Some(Gesture::Rotate("blinds", -3)));
    }

    #[test]
    fn malformed_gestures_are_refused() {
        assert_eq!(parse_gesture("rotate blinds"), None);
        assert_eq!(parse_gesture("rotate blinds up"), None);
        assert_eq!(parse_gesture("press a b"), None);
        assert_eq!(parse_gesture("wave kitchen"), None);
    }
}
