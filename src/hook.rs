//! PostToolUse handler: fold the session transcript into today's stats.
//!
//! Claude Code reads the handler's stdout/stderr, so the handler stays silent
//! and records its own problems in `stats/debug.log`.

use anyhow::{Context, Result};
use chrono::Local;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::config::Layout;
use crate::daily::{self, DailyStats, Loaded, SessionEntry};
use crate::pricing::PricingTable;
use crate::timeseries::Timeseries;
use crate::transcript;
use crate::write_lock::StatsLockGuard;

#[derive(Debug, Deserialize)]
pub struct HookInput {
    pub transcript_path: Option<PathBuf>,
    #[serde(default = "HookInput::default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
}

impl HookInput {
    fn default_session_id() -> String {
        "unknown".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Today's file (and the timeseries, when there were timed requests) was updated.
    Recorded,
    /// Input carried no transcript path, or the transcript had no tokens.
    Skipped,
}

/// Entry point used by `main`: never fails, whatever happens goes to the debug log.
pub fn run_from_stdin(layout: &Layout) {
    let mut raw = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw) {
        debug_log(layout, &format!("Failed to read hook input: {}", e));
        return;
    }
    if let Err(e) = run(layout, &raw) {
        debug_log(layout, &format!("{:#}", e));
    }
}

pub fn run(layout: &Layout, raw_input: &str) -> Result<HookOutcome> {
    let input: HookInput = match serde_json::from_str(raw_input) {
        Ok(input) => input,
        Err(e) => {
            debug_log(layout, &format!("Invalid JSON input from hook: {}", e));
            return Ok(HookOutcome::Skipped);
        }
    };
    let Some(transcript_path) = input
        .transcript_path
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
    else {
        return Ok(HookOutcome::Skipped);
    };

    let pricing = PricingTable::load(&layout.pricing_path());
    let parsed = transcript::parse_transcript(transcript_path, &pricing)?;
    if parsed.totals.total_tokens == 0 {
        return Ok(HookOutcome::Skipped);
    }

    let now = Local::now();
    let today = daily::today();
    let stats_file = layout.daily_path(&today);

    let _lock = StatsLockGuard::acquire(&layout.lock_path())?;

    let mut day = match DailyStats::load(&stats_file, &today)? {
        Loaded::Recovered { stats, backup } => {
            debug_log(
                layout,
                &format!("Corrupted stats file backed up to {}", backup.display()),
            );
            stats
        }
        loaded => loaded.into_stats(),
    };

    let stamp = now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    day.upsert_session(SessionEntry {
        session_id: input.session_id,
        date: today,
        started: String::new(),
        last_updated: stamp,
        project: input.cwd,
        by_model: parsed.by_model,
        totals: parsed.totals,
    });
    day.save(&stats_file)?;

    if !parsed.completed_requests.is_empty() {
        let ts_path = layout.timeseries_path();
        let mut series = Timeseries::load(&ts_path);
        series.update(&parsed.completed_requests, now);
        series
            .save(&ts_path)
            .context("Failed to save timeseries")?;
    }

    Ok(HookOutcome::Recorded)
}

/// Append a timestamped line to `stats/debug.log`. Best effort.
pub fn debug_log(layout: &Layout, msg: &str) {
    let path = layout.debug_log_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "[{}] {}", Local::now().to_rfc3339(), msg);
    }
}
