//! Rolling per-minute throughput buckets (`stats/timeseries.json`).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::transcript::{parse_timestamp, CompletedRequest};
use crate::write_core::{AtomicWriter, WriteOptions};

/// 30 minutes shown by the viewer plus a 5 minute buffer.
pub const WINDOW_MINUTES: i64 = 35;
const SEEN_IDS_MAX: usize = 1000;
const SEEN_IDS_KEEP: usize = 900;
const BUCKET_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bucket {
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub total_duration: f64,
    pub request_count: u64,
    pub output_tps: f64,
    pub total_tps: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    pub version: u32,
    /// Keyed by local minute, e.g. `2026-01-15T11:14`; a minute is frozen once it passes.
    pub buckets: BTreeMap<String, Bucket>,
    #[serde(default)]
    pub seen_request_ids: Vec<String>,
}

impl Default for Timeseries {
    fn default() -> Self {
        Self {
            version: 1,
            buckets: BTreeMap::new(),
            seen_request_ids: Vec::new(),
        }
    }
}

impl Timeseries {
    /// Load from `path`; anything unreadable starts a fresh series.
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        AtomicWriter::new(WriteOptions::fast())
            .write_str(path, &json)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        Ok(())
    }

    /// Drop stale buckets, then fold in requests not seen before.
    pub fn update(&mut self, requests: &[CompletedRequest], now: DateTime<Local>) {
        let cutoff = now - Duration::minutes(WINDOW_MINUTES);
        self.buckets
            .retain(|key, _| bucket_start(key).map(|t| t > cutoff).unwrap_or(false));

        if self.seen_request_ids.len() > SEEN_IDS_MAX {
            let excess = self.seen_request_ids.len() - SEEN_IDS_KEEP;
            self.seen_request_ids.drain(..excess);
        }
        let mut seen: HashSet<String> = self.seen_request_ids.iter().cloned().collect();

        for req in requests {
            if req.request_id.is_empty() || seen.contains(&req.request_id) {
                continue;
            }
            let Some(ts) = parse_timestamp(&req.timestamp) else {
                continue;
            };
            let key = ts.with_timezone(&Local).format(BUCKET_FORMAT).to_string();

            let bucket = self.buckets.entry(key).or_default();
            bucket.output_tokens += req.output_tokens;
            bucket.total_tokens += req.total_tokens;
            bucket.total_duration += req.duration_seconds;
            bucket.request_count += 1;
            bucket.cost += req.cost;
            if bucket.total_duration > 0.0 {
                bucket.output_tps = bucket.output_tokens as f64 / bucket.total_duration;
                bucket.total_tps = bucket.total_tokens as f64 / bucket.total_duration;
            }

            self.seen_request_ids.push(req.request_id.clone());
            seen.insert(req.request_id.clone());
        }
    }

    /// Buckets whose minute starts after `now - minutes`, oldest first.
    pub fn recent(&self, now: DateTime<Local>, minutes: i64) -> Vec<(&str, &Bucket)> {
        let cutoff = now - Duration::minutes(minutes);
        self.buckets
            .iter()
            .filter(|(key, _)| bucket_start(key).map(|t| t > cutoff).unwrap_or(false))
            .map(|(k, b)| (k.as_str(), b))
            .collect()
    }
}

fn bucket_start(key: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(&format!("{}:00", key), "%Y-%m-%dT%H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(id: &str, at: DateTime<Local>, output: u64, secs: f64) -> CompletedRequest {
        CompletedRequest {
            request_id: id.to_string(),
            timestamp: at.with_timezone(&Utc).to_rfc3339(),
            duration_seconds: secs,
            output_tokens: output,
            total_tokens: output * 2,
            output_tps: output as f64 / secs,
            total_tps: (output * 2) as f64 / secs,
            cost: 0.01,
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 15, 12, 0, 30).unwrap()
    }

    #[test]
    fn requests_land_in_local_minute_buckets() {
        let mut ts = Timeseries::default();
        let at = now() - Duration::minutes(2);
        ts.update(
            &[request("a", at, 100, 2.0), request("b", at, 300, 2.0)],
            now(),
        );

        let key = at.format(BUCKET_FORMAT).to_string();
        let bucket = &ts.buckets[&key];
        assert_eq!(bucket.request_count, 2);
        assert_eq!(bucket.output_tokens, 400);
        assert!((bucket.output_tps - 100.0).abs() < 1e-9);
        assert!((bucket.total_tps - 200.0).abs() < 1e-9);
        assert!((bucket.cost - 0.02).abs() < 1e-9);
    }

    #[test]
    fn duplicate_request_ids_are_counted_once() {
        let mut ts = Timeseries::default();
        let at = now() - Duration::minutes(1);
        ts.update(&[request("a", at, 100, 1.0)], now());
        ts.update(&[request("a", at, 100, 1.0)], now());
        assert_eq!(ts.buckets.values().map(|b| b.request_count).sum::<u64>(), 1);
        assert_eq!(ts.seen_request_ids, ["a"]);
    }

    #[test]
    fn stale_buckets_are_pruned() {
        let mut ts = Timeseries::default();
        ts.buckets
            .insert("2026-01-15T11:00".to_string(), Bucket::default());
        ts.buckets
            .insert("2026-01-15T11:50".to_string(), Bucket::default());
        ts.buckets.insert("garbage".to_string(), Bucket::default());

        ts.update(&[], now());
        let keys: Vec<&String> = ts.buckets.keys().collect();
        assert_eq!(keys, ["2026-01-15T11:50"]);
    }

    #[test]
    fn seen_ids_are_capped() {
        let mut ts = Timeseries::default();
        ts.seen_request_ids = (0..1001).map(|i| format!("r{}", i)).collect();
        ts.update(&[], now());
        assert_eq!(ts.seen_request_ids.len(), 900);
        assert_eq!(ts.seen_request_ids[0], "r101");
    }

    #[test]
    fn recent_filters_by_window() {
        let mut ts = Timeseries::default();
        ts.update(
            &[
                request("old", now() - Duration::minutes(20), 10, 1.0),
                request("new", now() - Duration::minutes(3), 10, 1.0),
            ],
            now(),
        );
        assert_eq!(ts.recent(now(), 30).len(), 2);
        assert_eq!(ts.recent(now(), 10).len(), 1);
    }

    #[test]
    fn unreadable_file_starts_fresh() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("timeseries.json");
        fs::write(&path, "[]").unwrap();
        assert_eq!(Timeseries::load(&path), Timeseries::default());
    }
}
