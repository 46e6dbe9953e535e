mod config;
mod daily;
mod error;
mod hook;
mod lifecycle;
mod pricing;
mod profile;
mod prompt;
mod settings;
mod status;
mod timeseries;
mod transcript;
mod utils;
mod viewer;
mod write_core;
mod write_lock;

use anyhow::{Context, Result};
use colored::Colorize;
use clap::{Parser, Subcommand};
use std::io;
use std::path::Path;

use config::{Layout, HOOK_HANDLER_NAME};
use profile::PatchOutcome;
use settings::MergeOutcome;

#[derive(Parser)]
#[command(
    name = "claude-stats",
    version,
    about = "Token usage statistics for Claude Code",
    long_about = "Records per-session token usage and estimated cost from Claude Code transcripts via a PostToolUse hook, and shows daily summaries."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the hook handler, register it in ~/.claude/settings.json and add the shell alias
    Install,

    /// Remove the hook, executables and alias; asks before deleting collected stats
    Uninstall,

    /// Show token stats for a day (default command)
    Show {
        /// Day to show, YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show what is currently installed
    Status,

    /// PostToolUse hook handler (reads hook JSON on stdin)
    #[command(hide = true)]
    Hook,
}

/// The installed copy named `log-token-stats` is the hook handler.
fn invoked_as_hook() -> bool {
    std::env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_stem().map(|s| s == HOOK_HANDLER_NAME))
        .unwrap_or(false)
}

fn main() -> Result<()> {
    if invoked_as_hook() {
        // Never fail a Claude Code tool call over stats.
        if let Ok(layout) = Layout::discover() {
            hook::run_from_stdin(&layout);
        }
        return Ok(());
    }

    let cli = Cli::parse();
    let layout = Layout::discover()?;

    let command = cli.command.unwrap_or(Commands::Show {
        date: None,
        format: "text".to_string(),
    });

    match command {
        Commands::Install => {
            let exe = std::env::current_exe().context("Cannot locate the running executable")?;
            let report = lifecycle::install(&layout, &exe, cli.verbose)?;
            if report.config == MergeOutcome::AlreadyConfigured {
                println!("\nSettings left unchanged.");
            }
            match report.alias {
                PatchOutcome::Added | PatchOutcome::AlreadyPresent => println!(
                    "\nDone. Open a new shell (or source {}) and run: claude-stats",
                    report.profile.display()
                ),
                _ => println!("\nDone. Run: {}", layout.viewer_path().display()),
            }
        }

        Commands::Uninstall => {
            let stdin = io::stdin();
            let mut prompt = prompt::LinePrompt::new(stdin.lock(), io::stdout());
            let report = lifecycle::uninstall(&layout, &mut prompt, cli.verbose);
            // Step failures were already reported and the rest of the teardown ran.
            if !report.is_clean() {
                let steps: Vec<String> =
                    report.failures.iter().map(|f| f.step.to_string()).collect();
                eprintln!(
                    "{} Uninstall finished with problems in: {}",
                    "⚠".yellow(),
                    steps.join(", ")
                );
            }
            println!("\nUninstalled claude-stats ({}).", report.summary());
        }

        Commands::Show { date, format } => {
            viewer::run(&layout, date.as_deref(), &format, cli.verbose)?;
        }

        Commands::Status => {
            status::run(&layout)?;
        }

        Commands::Hook => {
            hook::run_from_stdin(&layout);
        }
    }

    Ok(())
}
