//! Interactive command loop and report printing.

use std::io::{self, BufRead, Write};
use std::str::FromStr;

use chrono::Local;
use log::{debug, error};
use wgctl_core::TunnelId;
use wgctl_core::status::TunnelStatus;
use wgctl_core::tunnel::{ControlError, StatusReport, TunnelController};

use crate::app::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    List,
    Select(String),
    Status,
    Up,
    Down,
    Active,
    Help,
    Quit,
}

impl FromStr for ShellCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(String::new());
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        let command = match (verb, arg) {
            ("list" | "ls", None) => ShellCommand::List,
            ("select" | "use", Some(name)) => ShellCommand::Select(name.to_string()),
            ("select" | "use", None) => return Err("usage: select <name>".to_string()),
            ("status" | "refresh", None) => ShellCommand::Status,
            ("up" | "connect", None) => ShellCommand::Up,
            ("down" | "disconnect", None) => ShellCommand::Down,
            ("active", None) => ShellCommand::Active,
            ("help" | "?", None) => ShellCommand::Help,
            ("quit" | "exit" | "q", None) => ShellCommand::Quit,
            (_, Some(_)) if is_known(verb) => {
                return Err(format!("'{verb}' takes no arguments"));
            }
            _ => return Err(format!("unknown command '{verb}' (try 'help')")),
        };
        Ok(command)
    }
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb,
        "list"
            | "ls"
            | "status"
            | "refresh"
            | "up"
            | "connect"
            | "down"
            | "disconnect"
            | "active"
            | "help"
            | "?"
            | "quit"
            | "exit"
            | "q"
    )
}

const HELP: &str = "\
Commands:
  list                  show configurations (* = active, > = selected)
  select <name>         choose the configuration to operate on
  status | refresh      re-read the tunnel state
  up | connect          bring the selected tunnel up
  down | disconnect     bring the selected tunnel down
  active                show the active interface
  quit                  leave the shell";

pub fn print_report(report: &StatusReport) {
    let name = report
        .selection
        .as_ref()
        .map_or("<none>", |s| s.as_str());
    let active = report.active.as_ref().map_or("none", |a| a.as_str());
    println!(
        "[{}] {}: {} (active: {})",
        Local::now().format("%H:%M:%S"),
        name,
        report.state,
        active
    );
    if let Some(diagnostics) = report.diagnostics() {
        let diagnostics = diagnostics.trim_end();
        if !diagnostics.is_empty() {
            println!("{diagnostics}");
        }
    }
    let detail = report.detail.trim_end();
    if !detail.is_empty() {
        println!("{detail}");
    }
}

pub fn print_configs(controller: &TunnelController, active: &[TunnelId]) {
    let mut configs = controller.list_configs();
    if configs.is_empty() {
        println!(
            "No configurations found in {}",
            controller.config_directory().path().display()
        );
        return;
    }
    configs.sort();

    let selection = controller.selection();
    for config in configs {
        let active_mark = if active.contains(&config) { '*' } else { ' ' };
        let selected_mark = if selection.as_ref() == Some(&config) { '>' } else { ' ' };
        println!("{selected_mark}{active_mark} {config}");
    }
}

/// Runs the interactive shell until `quit` or end of input.
/// A failed operation, including a missing credential, is reported and the
/// shell carries on.
pub fn run_shell(state: &AppState) {
    let controller = &state.controller;

    println!(
        "wgctl: tunnels from {} (type 'help' for commands)",
        state.settings.config_dir.display()
    );
    match controller.initialize() {
        Ok(report) => {
            print_report(&report);
            if let Some(poller) = &state.poller {
                poller.start(Box::new(|report: &StatusReport| {
                    println!();
                    print_report(report);
                }));
            }
        }
        Err(e) => println!("{e}"),
    }

    let stdin = io::stdin();
    command_loop(controller, stdin.lock());
}

fn command_loop(controller: &TunnelController, input: impl BufRead) {
    let mut lines = input.lines();
    loop {
        print!("wgctl> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                error!("Failed to read command: {}", e);
                break;
            }
            None => break,
        };

        let command = match line.parse::<ShellCommand>() {
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    println!("{message}");
                }
                continue;
            }
        };
        debug!("Shell command: {:?}", command);

        match execute(controller, command) {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => println!("{e}"),
        }
    }
}

/// Returns `false` when the shell should exit.
fn execute(controller: &TunnelController, command: ShellCommand) -> Result<bool, ControlError> {
    match command {
        ShellCommand::List => {
            print_configs(controller, &controller.list_active()?);
        }
        ShellCommand::Select(name) => {
            controller.select(&name)?;
            print_report(&controller.refresh_status()?);
        }
        ShellCommand::Status => print_report(&controller.refresh_status()?),
        ShellCommand::Up => {
            let report = controller.start()?;
            print_report(&report);
            if report.state != TunnelStatus::Up {
                println!("Tunnel did not come up");
            }
        }
        ShellCommand::Down => print_report(&controller.stop()?),
        ShellCommand::Active => match controller.get_active()? {
            Some(active) => println!("{active}"),
            None => println!("No active tunnel"),
        },
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit => return Ok(false),
    }
    Ok(true)
}
