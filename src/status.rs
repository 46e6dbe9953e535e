use anyhow::Result;
use colored::Colorize;

use crate::config::Layout;
use crate::daily;
use crate::profile;
use crate::settings;

/// Read-only view of what install put in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallState {
    pub hook_command: Option<String>,
    pub hook_section_foreign: bool,
    pub handler_present: bool,
    pub viewer_present: bool,
    pub alias_profile: Option<String>,
    pub stats_days: usize,
}

pub fn inspect(layout: &Layout) -> Result<InstallState> {
    let doc = settings::load(&layout.settings_path())?;
    let hook_command = doc.as_ref().and_then(settings::installed_command);
    let ours = hook_command.as_deref() == Some(layout.hook_command().as_str());
    let hook_section_foreign = !ours && doc.as_ref().map(settings::is_configured).unwrap_or(false);

    let alias_profile = layout
        .profile_candidates()
        .into_iter()
        .find(|p| profile::has_alias(p))
        .map(|p| p.display().to_string());

    Ok(InstallState {
        hook_command: hook_command.filter(|_| ours),
        hook_section_foreign,
        handler_present: layout.hook_handler_path().is_file(),
        viewer_present: layout.viewer_path().is_file(),
        alias_profile,
        stats_days: daily::list_days(&layout.stats_dir()).len(),
    })
}

pub fn run(layout: &Layout) -> Result<()> {
    let state = inspect(layout)?;

    println!("📋 claude-stats status:\n");
    match (&state.hook_command, state.hook_section_foreign) {
        (Some(cmd), _) => println!("{} Hook registered: {}", "✓".green(), cmd),
        (None, true) => println!(
            "{} PostToolUse already holds another hook; claude-stats is not registered",
            "•".yellow()
        ),
        (None, false) => println!("{} Hook not registered", "✗".red()),
    }
    print_presence("Hook handler", state.handler_present, layout.hook_handler_path());
    print_presence("Viewer", state.viewer_present, layout.viewer_path());
    match &state.alias_profile {
        Some(p) => println!("{} Alias claude-stats in {}", "✓".green(), p),
        None => println!("{} Alias claude-stats not found", "✗".red()),
    }
    println!(
        "  Stats: {} day(s) in {}",
        state.stats_days,
        layout.stats_dir().display()
    );
    Ok(())
}

fn print_presence(label: &str, present: bool, path: std::path::PathBuf) {
    if present {
        println!("{} {}: {}", "✓".green(), label, path.display());
    } else {
        println!("{} {}: missing", "✗".red(), label);
    }
}
