//! Terminal front end for wgctl.
//! One-shot subcommands for scripts plus an interactive shell.

mod app;
mod paths;
mod shell;
mod terminal;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use wgctl_core::executor::ElevationMode;
use wgctl_core::status::TunnelStatus;
use wgctl_core::tunnel::{ControlError, TunnelController};

use crate::app::{AppState, Overrides};
use crate::shell::{print_configs, print_report, run_shell};
use crate::terminal::TerminalMode;

#[derive(Parser)]
#[command(name = "wgctl")]
#[command(about = "Bring WireGuard tunnels up and down from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding <name>.conf tunnel configurations
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// How to elevate: sudo, direct or auto
    #[arg(long, global = true, value_parser = parse_elevation)]
    elevation: Option<ElevationMode>,

    /// Kill external commands after this many seconds (0 waits forever)
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configurations, marking the active one
    List,
    /// Print the interface currently up
    Active,
    /// Show the state of a tunnel (default: the active or first configuration)
    Status { name: Option<String> },
    /// Bring a tunnel up
    Up { name: Option<String> },
    /// Bring a tunnel down
    Down { name: Option<String> },
    /// Interactive shell (the default)
    Shell,
}

fn parse_elevation(value: &str) -> Result<ElevationMode, String> {
    match value {
        "sudo" => Ok(ElevationMode::Sudo),
        "direct" => Ok(ElevationMode::Direct),
        "auto" => Ok(ElevationMode::Auto),
        other => Err(format!("unknown elevation '{other}' (sudo, direct, auto)")),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    info!("starting wgctl");

    let cli = Cli::parse();
    let overrides = Overrides {
        config_dir: cli.config_dir,
        elevation: cli.elevation,
        timeout_secs: cli.timeout,
    };
    let state = Arc::new(AppState::new(&overrides));

    // Ctrl+C cleanup; the password prompt may have echo switched off.
    {
        let state = state.clone();
        let terminal = TerminalMode::controlling();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("received signal, stopping poller and exiting");
            if let Some(terminal) = &terminal {
                terminal.restore();
            }
            state.cleanup();
            std::process::exit(130);
        }) {
            error!("Error setting Ctrl-C handler: {e}");
        }
    }

    let result = match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            run_shell(&state);
            Ok(ExitCode::SUCCESS)
        }
        command => run_once(&state.controller, command),
    };
    state.cleanup();

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("wgctl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_once(controller: &TunnelController, command: Commands) -> Result<ExitCode, ControlError> {
    match command {
        Commands::List => {
            print_configs(controller, &controller.list_active()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Active => match controller.get_active()? {
            Some(active) => {
                println!("{active}");
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::from(1)),
        },
        Commands::Status { name } => {
            let report = match name {
                Some(name) => {
                    select_named(controller, &name)?;
                    controller.refresh_status()?
                }
                None => controller.initialize()?,
            };
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Up { name } => {
            prepare(controller, name.as_deref())?;
            let report = controller.start()?;
            print_report(&report);
            Ok(exit_for(report.state, TunnelStatus::Up))
        }
        Commands::Down { name } => {
            prepare(controller, name.as_deref())?;
            let report = controller.stop()?;
            print_report(&report);
            Ok(exit_for(report.state, TunnelStatus::Down))
        }
        Commands::Shell => Ok(ExitCode::SUCCESS),
    }
}

/// Selects `name`, or the startup default when none is given. Runs no
/// refresh; the caller's operation ends with one.
fn prepare(controller: &TunnelController, name: Option<&str>) -> Result<(), ControlError> {
    match name {
        Some(name) => select_named(controller, name),
        None => controller.select_default().map(|_| ()),
    }
}

fn select_named(controller: &TunnelController, name: &str) -> Result<(), ControlError> {
    match controller.select(name) {
        // An interface can be up without a config file we can read.
        Err(ControlError::UnknownConfig(_)) => {
            controller.get_active()?;
            controller.select(name)
        }
        other => other,
    }
}

fn exit_for(observed: TunnelStatus, wanted: TunnelStatus) -> ExitCode {
    if observed == wanted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
