//! Token usage extraction from a Claude Code session transcript (JSONL).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::pricing::PricingTable;

/// Requests shorter than this are streaming noise; longer ones are clock skew.
const MIN_DURATION_SECS: f64 = 0.1;
const MAX_DURATION_SECS: f64 = 3600.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl TokenCounts {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens + self.cache_creation_tokens
    }

    pub fn add(&mut self, other: &TokenCounts) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }

    /// Streaming writes several usage snapshots per request; keep the largest of each field.
    fn max_merge(&mut self, other: &TokenCounts) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.max(other.cache_read_tokens);
        self.cache_creation_tokens = self.cache_creation_tokens.max(other.cache_creation_tokens);
    }

    fn from_usage(usage: &Value) -> Self {
        let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
        Self {
            input_tokens: field("input_tokens"),
            output_tokens: field("output_tokens"),
            cache_read_tokens: field("cache_read_input_tokens"),
            cache_creation_tokens: field("cache_creation_input_tokens"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelUsage {
    #[serde(flatten)]
    pub tokens: TokenCounts,
    pub request_count: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTotals {
    #[serde(flatten)]
    pub tokens: TokenCounts,
    pub total_tokens: u64,
    pub request_count: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRequest {
    pub request_id: String,
    /// Timestamp of the last streamed entry, as written in the transcript.
    pub timestamp: String,
    pub duration_seconds: f64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub output_tps: f64,
    pub total_tps: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTranscript {
    pub by_model: BTreeMap<String, ModelUsage>,
    pub totals: SessionTotals,
    pub completed_requests: Vec<CompletedRequest>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    timestamp: Option<String>,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    model: Option<String>,
    usage: Option<Value>,
}

struct RequestUsage {
    model: String,
    tokens: TokenCounts,
    first_ts: Option<String>,
    last_ts: Option<String>,
}

/// Parse the transcript at `path`. A missing file yields an empty result.
pub fn parse_transcript(path: &Path, pricing: &PricingTable) -> Result<ParsedTranscript> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ParsedTranscript::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to open transcript {}", path.display()))
        }
    };
    parse_lines(BufReader::new(file), pricing)
}

/// Aggregate usage per request id, then per model. Blank and malformed lines are skipped.
pub fn parse_lines<R: BufRead>(reader: R, pricing: &PricingTable) -> Result<ParsedTranscript> {
    let mut order: Vec<String> = Vec::new();
    let mut requests: HashMap<String, RequestUsage> = HashMap::new();

    for line in reader.lines() {
        let line = line.context("Failed to read transcript line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Entry>(line) else {
            continue;
        };
        if entry.kind.as_deref() != Some("assistant") {
            continue;
        }
        let Some(message) = entry.message else {
            continue;
        };
        let usage = match message.usage {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map),
            _ => continue,
        };
        let request_id = match entry.request_id {
            Some(id) if !id.is_empty() => id,
            _ => continue,
        };

        let model = message.model.unwrap_or_else(|| "unknown".to_string());
        let tokens = TokenCounts::from_usage(&usage);

        match requests.get_mut(&request_id) {
            Some(req) => {
                req.tokens.max_merge(&tokens);
                if model != "unknown" {
                    req.model = model;
                }
                if let Some(ts) = entry.timestamp {
                    req.first_ts.get_or_insert_with(|| ts.clone());
                    req.last_ts = Some(ts);
                }
            }
            None => {
                order.push(request_id.clone());
                requests.insert(
                    request_id,
                    RequestUsage {
                        model,
                        tokens,
                        first_ts: entry.timestamp.clone(),
                        last_ts: entry.timestamp,
                    },
                );
            }
        }
    }

    let mut parsed = ParsedTranscript::default();

    for req in requests.values() {
        let usage = parsed.by_model.entry(req.model.clone()).or_default();
        usage.tokens.add(&req.tokens);
        usage.request_count += 1;
    }
    for (model, usage) in parsed.by_model.iter_mut() {
        usage.cost = pricing.cost(&usage.tokens, model);
    }

    let totals = &mut parsed.totals;
    for usage in parsed.by_model.values() {
        totals.tokens.add(&usage.tokens);
        totals.cost += usage.cost;
    }
    totals.request_count = requests.len() as u64;
    totals.total_tokens = totals.tokens.total();

    for id in &order {
        let req = &requests[id];
        if let Some(done) = completed(id, req, pricing) {
            parsed.completed_requests.push(done);
        }
    }

    Ok(parsed)
}

fn completed(id: &str, req: &RequestUsage, pricing: &PricingTable) -> Option<CompletedRequest> {
    let first = parse_timestamp(req.first_ts.as_deref()?)?;
    let last_raw = req.last_ts.as_deref()?;
    let last = parse_timestamp(last_raw)?;
    let duration = (last - first).num_microseconds()? as f64 / 1_000_000.0;
    if !(duration > MIN_DURATION_SECS && duration < MAX_DURATION_SECS) {
        return None;
    }
    let total_tokens = req.tokens.total();
    Some(CompletedRequest {
        request_id: id.to_string(),
        timestamp: last_raw.to_string(),
        duration_seconds: duration,
        output_tokens: req.tokens.output_tokens,
        total_tokens,
        output_tps: req.tokens.output_tokens as f64 / duration,
        total_tps: total_tokens as f64 / duration,
        cost: pricing.cost(&req.tokens, &req.model),
    })
}

/// RFC 3339 (`Z` or offset); timestamps without a zone are taken as UTC.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn assistant(req: &str, model: &str, ts: &str, input: u64, output: u64) -> String {
        serde_json::json!({
            "type": "assistant",
            "requestId": req,
            "timestamp": ts,
            "message": {
                "model": model,
                "usage": {
                    "input_tokens": input,
                    "output_tokens": output,
                    "cache_read_input_tokens": 100,
                    "cache_creation_input_tokens": 10
                }
            }
        })
        .to_string()
    }

    fn parse(lines: &[String]) -> ParsedTranscript {
        let text = lines.join("\n");
        parse_lines(Cursor::new(text), &PricingTable::default()).unwrap()
    }

    #[test]
    fn streaming_snapshots_keep_max_per_field() {
        let parsed = parse(&[
            assistant("r1", "claude-sonnet-4-20250514", "2026-01-15T10:00:00.000Z", 50, 1),
            assistant("r1", "claude-sonnet-4-20250514", "2026-01-15T10:00:02.000Z", 40, 200),
        ]);
        let usage = &parsed.by_model["claude-sonnet-4-20250514"];
        assert_eq!(usage.tokens.input_tokens, 50);
        assert_eq!(usage.tokens.output_tokens, 200);
        assert_eq!(usage.tokens.cache_read_tokens, 100);
        assert_eq!(usage.request_count, 1);
        assert_eq!(parsed.totals.request_count, 1);
        assert_eq!(parsed.totals.total_tokens, 50 + 200 + 100 + 10);
    }

    #[test]
    fn skips_non_assistant_and_malformed_lines() {
        let lines = vec![
            "{\"type\":\"user\",\"message\":{\"content\":\"hi\"}}".to_string(),
            "not json at all".to_string(),
            String::new(),
            "{\"type\":\"assistant\",\"requestId\":\"r0\",\"message\":{\"usage\":{}}}".to_string(),
            "{\"type\":\"assistant\",\"message\":{\"usage\":{\"output_tokens\":5}}}".to_string(),
            assistant("r2", "claude-3-5-haiku-20241022", "2026-01-15T10:00:00Z", 1, 1),
        ];
        let parsed = parse(&lines);
        assert_eq!(parsed.totals.request_count, 1);
        assert_eq!(parsed.by_model.len(), 1);
    }

    #[test]
    fn unknown_model_is_upgraded_by_later_snapshot() {
        let parsed = parse(&[
            assistant("r1", "unknown", "2026-01-15T10:00:00Z", 1, 1),
            assistant("r1", "claude-opus-4-5-20251101", "2026-01-15T10:00:01Z", 1, 2),
        ]);
        assert!(parsed.by_model.contains_key("claude-opus-4-5-20251101"));
        assert!(!parsed.by_model.contains_key("unknown"));
    }

    #[test]
    fn completed_requests_need_plausible_duration() {
        let parsed = parse(&[
            assistant("fast", "m", "2026-01-15T10:00:00.000Z", 0, 10),
            assistant("fast", "m", "2026-01-15T10:00:00.050Z", 0, 10),
            assistant("ok", "m", "2026-01-15T10:00:00Z", 0, 100),
            assistant("ok", "m", "2026-01-15T10:00:04Z", 0, 400),
            assistant("single", "m", "2026-01-15T10:01:00Z", 0, 5),
        ]);
        assert_eq!(parsed.completed_requests.len(), 1);
        let req = &parsed.completed_requests[0];
        assert_eq!(req.request_id, "ok");
        assert_eq!(req.timestamp, "2026-01-15T10:00:04Z");
        assert!((req.duration_seconds - 4.0).abs() < 1e-9);
        assert!((req.output_tps - 100.0).abs() < 1e-9);
        assert_eq!(req.total_tokens, 400 + 100 + 10);
    }

    #[test]
    fn cost_is_priced_per_model() {
        let parsed = parse(&[assistant(
            "r1",
            "claude-sonnet-4-20250514",
            "2026-01-15T10:00:00Z",
            1_000_000,
            0,
        )]);
        let expected = 3.00 + (100.0 * 0.30 + 10.0 * 3.75) / 1_000_000.0;
        assert!((parsed.totals.cost - expected).abs() < 1e-9);
    }

    #[test]
    fn missing_transcript_is_empty() {
        let parsed =
            parse_transcript(Path::new("/nonexistent/transcript.jsonl"), &PricingTable::default())
                .unwrap();
        assert_eq!(parsed, ParsedTranscript::default());
    }

    #[test]
    fn timestamps_with_and_without_zone() {
        let z = parse_timestamp("2026-01-15T10:00:00Z").unwrap();
        let offset = parse_timestamp("2026-01-15T12:00:00+02:00").unwrap();
        let naive = parse_timestamp("2026-01-15T10:00:00.5").unwrap();
        assert_eq!(z, offset);
        assert_eq!((naive - z).num_milliseconds(), 500);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
