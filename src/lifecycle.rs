//! Install / uninstall sequencing.
//!
//! Install stops at the first failing step and names it. Uninstall runs every
//! step regardless and collects failures, so one broken file never blocks the
//! rest of the teardown. Neither rolls back: each step is safe to re-run.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{Layout, ALIAS_MARKER};
use crate::profile::{self, PatchOutcome};
use crate::prompt::Confirm;
use crate::settings::{self, MergeOutcome};
use crate::write_core::{AtomicWriter, WriteOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    EnsureDirectories,
    PlaceExecutables,
    MergeConfig,
    PatchAlias,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStep::EnsureDirectories => "ensure directories",
            InstallStep::PlaceExecutables => "place executables",
            InstallStep::MergeConfig => "merge settings",
            InstallStep::PatchAlias => "patch shell alias",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStep {
    RemoveExecutables,
    UnmergeConfig,
    UnpatchAlias,
    ConfirmDataDeletion,
    DeleteDataStore,
}

impl fmt::Display for UninstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UninstallStep::RemoveExecutables => "remove executables",
            UninstallStep::UnmergeConfig => "unmerge settings",
            UninstallStep::UnpatchAlias => "unpatch shell alias",
            UninstallStep::ConfirmDataDeletion => "confirm data deletion",
            UninstallStep::DeleteDataStore => "delete data store",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct InstallReport {
    pub config: MergeOutcome,
    pub profile: PathBuf,
    pub alias: PatchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStoreOutcome {
    Deleted,
    Preserved,
    Absent,
}

#[derive(Debug)]
pub struct StepFailure {
    pub step: UninstallStep,
    pub error: anyhow::Error,
}

#[derive(Debug)]
pub struct UninstallReport {
    pub removed: Vec<PathBuf>,
    pub config: Option<MergeOutcome>,
    pub alias: Option<PatchOutcome>,
    pub data: DataStoreOutcome,
    pub failures: Vec<StepFailure>,
}

impl UninstallReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One line describing what the run changed.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} executable(s) removed", self.removed.len())];
        if self.config == Some(MergeOutcome::Removed) {
            parts.push("hook unregistered".to_string());
        }
        if let Some(PatchOutcome::Removed(_)) = self.alias {
            parts.push("alias removed".to_string());
        }
        parts.push(
            match self.data {
                DataStoreOutcome::Deleted => "stats deleted",
                DataStoreOutcome::Preserved => "stats kept",
                DataStoreOutcome::Absent => "no stats to delete",
            }
            .to_string(),
        );
        parts.join(", ")
    }
}

/// `EnsureDirectories → PlaceExecutables → MergeConfig → PatchAlias`.
/// `source_exe` is the binary copied into the hooks directory under both names.
pub fn install(layout: &Layout, source_exe: &Path, verbose: u8) -> Result<InstallReport> {
    ensure_directories(layout)
        .with_context(|| format!("Install step '{}' failed", InstallStep::EnsureDirectories))?;

    let placed = place_executables(layout, source_exe, verbose)
        .with_context(|| format!("Install step '{}' failed", InstallStep::PlaceExecutables))?;
    for path in &placed {
        println!("{} Installed {}", "✓".green(), path.display());
    }

    let settings_path = layout.settings_path();
    let reg = settings::registration(&layout.hook_command());
    let config = settings::install(&settings_path, &reg)
        .with_context(|| format!("Install step '{}' failed", InstallStep::MergeConfig))?;
    match config {
        MergeOutcome::Installed => println!(
            "{} Registered PostToolUse hook in {}",
            "✓".green(),
            settings_path.display()
        ),
        _ => println!(
            "{} PostToolUse hook already configured in {} (left unchanged)",
            "•".yellow(),
            settings_path.display()
        ),
    }

    let profile_path = layout.shell_profile();
    let alias = profile::add_alias(&profile_path, ALIAS_MARKER, &layout.alias_line())
        .with_context(|| format!("Install step '{}' failed", InstallStep::PatchAlias))?;
    match alias {
        PatchOutcome::Added => println!(
            "{} Added alias claude-stats to {}",
            "✓".green(),
            profile_path.display()
        ),
        PatchOutcome::AlreadyPresent => println!(
            "{} Alias claude-stats already present in {}",
            "•".yellow(),
            profile_path.display()
        ),
        _ => println!(
            "{} No shell profile found (~/.zshrc or ~/.bashrc); run {} directly",
            "•".yellow(),
            layout.viewer_path().display()
        ),
    }

    if verbose > 0 {
        eprintln!("base dir:     {}", layout.base_dir().display());
        eprintln!("hook command: {}", layout.hook_command());
        eprintln!("stats dir:    {}", layout.stats_dir().display());
    }

    Ok(InstallReport {
        config,
        profile: profile_path,
        alias,
    })
}

fn ensure_directories(layout: &Layout) -> Result<()> {
    for dir in [layout.hooks_dir(), layout.stats_dir()] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

fn place_executables(layout: &Layout, source_exe: &Path, verbose: u8) -> Result<Vec<PathBuf>> {
    let writer = AtomicWriter::new(WriteOptions::executable());
    let source_real = fs::canonicalize(source_exe)
        .with_context(|| format!("Cannot resolve executable {}", source_exe.display()))?;

    let mut placed = Vec::new();
    for dest in [layout.hook_handler_path(), layout.viewer_path()] {
        if fs::canonicalize(&dest).ok().as_deref() == Some(source_real.as_path()) {
            if verbose > 0 {
                eprintln!("{} is the running binary, not copying", dest.display());
            }
            placed.push(dest);
            continue;
        }
        writer
            .copy_file(&source_real, &dest)
            .with_context(|| format!("Failed to install {}", dest.display()))?;
        placed.push(dest);
    }
    Ok(placed)
}

/// `RemoveExecutables → UnmergeConfig → UnpatchAlias → ConfirmDataDeletion → Delete|Preserve`.
/// Every step runs even when an earlier one failed.
pub fn uninstall(layout: &Layout, confirm: &mut dyn Confirm, verbose: u8) -> UninstallReport {
    let mut failures = Vec::new();

    let removed = match remove_executables(layout) {
        Ok(removed) => {
            for path in &removed {
                println!("{} Removed {}", "✓".green(), path.display());
            }
            removed
        }
        Err(error) => {
            record_failure(&mut failures, UninstallStep::RemoveExecutables, error);
            Vec::new()
        }
    };

    let settings_path = layout.settings_path();
    let config = match settings::uninstall(&settings_path) {
        Ok(outcome) => {
            if outcome == MergeOutcome::Removed {
                println!(
                    "{} Removed PostToolUse hook from {}",
                    "✓".green(),
                    settings_path.display()
                );
            } else if verbose > 0 {
                eprintln!("no hook registration in {}", settings_path.display());
            }
            Some(outcome)
        }
        Err(e) => {
            if e.is_parse() {
                eprintln!(
                    "{} {} left as is; remove the PostToolUse entry for {} by hand",
                    "•".yellow(),
                    settings_path.display(),
                    layout.hook_command()
                );
            }
            record_failure(&mut failures, UninstallStep::UnmergeConfig, e.into());
            None
        }
    };

    let alias = unpatch_all_profiles(layout, verbose, &mut failures);

    let data = settle_data_store(layout, confirm, &mut failures);

    UninstallReport {
        removed,
        config,
        alias,
        data,
        failures,
    }
}

fn remove_executables(layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in [layout.hook_handler_path(), layout.viewer_path()] {
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to remove {}", path.display()))
            }
        }
    }
    Ok(removed)
}

/// The alias may sit in whichever candidate existed at install time, so every
/// candidate is cleaned. Reports the strongest outcome seen.
fn unpatch_all_profiles(
    layout: &Layout,
    verbose: u8,
    failures: &mut Vec<StepFailure>,
) -> Option<PatchOutcome> {
    let mut result = None;
    for path in layout.profile_candidates() {
        match profile::remove_alias(&path, ALIAS_MARKER) {
            Ok(outcome @ PatchOutcome::Removed(_)) => {
                println!("{} Removed alias claude-stats from {}", "✓".green(), path.display());
                result = Some(outcome);
            }
            Ok(outcome) => {
                if verbose > 0 {
                    eprintln!("{}: {:?}", path.display(), outcome);
                }
                result.get_or_insert(outcome);
            }
            Err(e) => record_failure(failures, UninstallStep::UnpatchAlias, e.into()),
        }
    }
    result
}

fn settle_data_store(
    layout: &Layout,
    confirm: &mut dyn Confirm,
    failures: &mut Vec<StepFailure>,
) -> DataStoreOutcome {
    let stats_dir = layout.stats_dir();
    if !stats_dir.is_dir() {
        return DataStoreOutcome::Absent;
    }

    let question = format!("Delete accumulated stats in {}?", stats_dir.display());
    let yes = match confirm.confirm(&question) {
        Ok(yes) => yes,
        Err(error) => {
            record_failure(failures, UninstallStep::ConfirmDataDeletion, error);
            false
        }
    };

    if !yes {
        println!("{} Kept stats in {}", "•".yellow(), stats_dir.display());
        return DataStoreOutcome::Preserved;
    }

    match fs::remove_dir_all(&stats_dir) {
        Ok(()) => {
            println!("{} Deleted {}", "✓".green(), stats_dir.display());
            DataStoreOutcome::Deleted
        }
        Err(err) => {
            let error = anyhow::Error::new(err)
                .context(format!("Failed to delete {}", stats_dir.display()));
            record_failure(failures, UninstallStep::DeleteDataStore, error);
            DataStoreOutcome::Preserved
        }
    }
}

fn record_failure(failures: &mut Vec<StepFailure>, step: UninstallStep, error: anyhow::Error) {
    let failure = StepFailure { step, error };
    eprintln!("{} {}: {:#}", "✗".red(), failure.step, failure.error);
    failures.push(failure);
}
