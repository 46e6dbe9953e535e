//! Per-day stats file (`stats/YYYY-MM-DD.json`).

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::transcript::{ModelUsage, SessionTotals, TokenCounts};
use crate::write_core::{AtomicWriter, WriteOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub started: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub by_model: BTreeMap<String, ModelUsage>,
    #[serde(flatten)]
    pub totals: SessionTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyTotals {
    #[serde(flatten)]
    pub tokens: TokenCounts,
    pub total_tokens: u64,
    pub request_count: u64,
    pub session_count: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: String,
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
    #[serde(default)]
    pub daily_totals: DailyTotals,
    #[serde(default)]
    pub by_model: BTreeMap<String, ModelUsage>,
}

/// Result of reading a daily file.
#[derive(Debug)]
pub enum Loaded {
    Existing(DailyStats),
    Fresh(DailyStats),
    /// The file did not parse; it was copied to `backup` and a fresh day started.
    Recovered { stats: DailyStats, backup: PathBuf },
}

impl Loaded {
    pub fn into_stats(self) -> DailyStats {
        match self {
            Loaded::Existing(s) | Loaded::Fresh(s) | Loaded::Recovered { stats: s, .. } => s,
        }
    }
}

impl DailyStats {
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            ..Self::default()
        }
    }

    /// Read `path`. A corrupt file is preserved next to it before starting over.
    pub fn load(path: &Path, date: &str) -> Result<Loaded> {
        if !path.exists() {
            return Ok(Loaded::Fresh(Self::new(date)));
        }
        let raw =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_json::from_str::<DailyStats>(&raw) {
            Ok(stats) => Ok(Loaded::Existing(stats)),
            Err(_) => {
                let backup = corrupted_backup_path(path);
                fs::copy(path, &backup).with_context(|| {
                    format!("Failed to back up corrupt stats to {}", backup.display())
                })?;
                Ok(Loaded::Recovered {
                    stats: Self::new(date),
                    backup,
                })
            }
        }
    }

    /// Read `path` for display; a missing or corrupt file is `None`.
    pub fn read(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        AtomicWriter::new(WriteOptions::fast())
            .write_str(path, &json)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        Ok(())
    }

    /// Replace the entry for `entry.session_id`, keeping its original start time,
    /// or append a new one. Totals are recomputed afterwards.
    pub fn upsert_session(&mut self, mut entry: SessionEntry) {
        match self
            .sessions
            .iter_mut()
            .find(|s| s.session_id == entry.session_id)
        {
            Some(existing) => {
                if !existing.started.is_empty() {
                    entry.started = existing.started.clone();
                } else {
                    entry.started = entry.last_updated.clone();
                }
                *existing = entry;
            }
            None => {
                entry.started = entry.last_updated.clone();
                self.sessions.push(entry);
            }
        }
        self.recalculate();
    }

    /// Rebuild `daily_totals` and `by_model` from the sessions.
    pub fn recalculate(&mut self) {
        let mut totals = DailyTotals::default();
        let mut by_model: BTreeMap<String, ModelUsage> = BTreeMap::new();

        for session in &self.sessions {
            totals.tokens.add(&session.totals.tokens);
            totals.total_tokens += session.totals.total_tokens;
            totals.request_count += session.totals.request_count;
            totals.cost += session.totals.cost;

            for (model, usage) in &session.by_model {
                let acc = by_model.entry(model.clone()).or_default();
                acc.tokens.add(&usage.tokens);
                acc.request_count += usage.request_count;
                acc.cost += usage.cost;
            }
        }
        totals.session_count = self.sessions.len() as u64;

        self.daily_totals = totals;
        self.by_model = by_model;
    }
}

fn corrupted_backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "stats".to_string());
    let stamp = Local::now().format("%H%M%S");
    path.with_file_name(format!("{}.corrupted.{}.json", stem, stamp))
}

/// `YYYY-MM-DD` for today in local time.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Daily stats files in `stats_dir`, newest first.
pub fn list_days(stats_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(stats_dir) else {
        return Vec::new();
    };
    let mut days: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
        .filter(|stem| chrono::NaiveDate::parse_from_str(stem, "%Y-%m-%d").is_ok())
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days
}
