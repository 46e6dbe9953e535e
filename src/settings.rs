//! Registration of the stats hook in Claude Code's `settings.json`.
//!
//! The document is mutated as a whole `serde_json::Value` (with `preserve_order`),
//! so every key outside `hooks.PostToolUse` is written back as it was read.

use serde_json::{json, Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::{HOOK_EVENT, HOOK_MATCHER};
use crate::error::{DocumentError, SetupError};
use crate::write_core::{AtomicWriter, WriteOptions};

/// What to do with the hook section.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOp {
    /// Insert this registration unless the event already holds anything.
    Install(Value),
    /// Delete the event key, and `hooks` with it if nothing else is left.
    Uninstall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Installed,
    AlreadyConfigured,
    Removed,
    NotPresent,
}

/// The value stored under `hooks.PostToolUse`: one match-all rule running `command`.
pub fn registration(command: &str) -> Value {
    json!([
        {
            "matcher": HOOK_MATCHER,
            "hooks": [
                { "type": "command", "command": command }
            ]
        }
    ])
}

/// Apply `op` to a parsed settings document. Pure: no filesystem access.
pub fn mutate(mut doc: Value, op: &HookOp) -> Result<(Value, MergeOutcome), DocumentError> {
    let root = doc.as_object_mut().ok_or(DocumentError::RootNotObject)?;

    let outcome = match op {
        HookOp::Install(reg) => install_into(root, reg)?,
        HookOp::Uninstall => remove_from(root),
    };
    Ok((doc, outcome))
}

fn install_into(root: &mut Map<String, Value>, reg: &Value) -> Result<MergeOutcome, DocumentError> {
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| Value::Object(Map::new()));
    if hooks.is_null() {
        *hooks = Value::Object(Map::new());
    }
    let hooks = hooks.as_object_mut().ok_or(DocumentError::HooksNotObject)?;

    if hooks.get(HOOK_EVENT).map(is_vacant).unwrap_or(true) {
        hooks.insert(HOOK_EVENT.to_string(), reg.clone());
        Ok(MergeOutcome::Installed)
    } else {
        Ok(MergeOutcome::AlreadyConfigured)
    }
}

fn remove_from(root: &mut Map<String, Value>) -> MergeOutcome {
    let Some(hooks) = root.get_mut("hooks").and_then(Value::as_object_mut) else {
        return MergeOutcome::NotPresent;
    };
    if hooks.shift_remove(HOOK_EVENT).is_none() {
        return MergeOutcome::NotPresent;
    }
    if hooks.is_empty() {
        root.shift_remove("hooks");
    }
    MergeOutcome::Removed
}

/// Null, `[]` and `{}` count as "nothing registered yet".
fn is_vacant(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// True when the event slot holds anything (ours or the user's).
pub fn is_configured(doc: &Value) -> bool {
    doc.get("hooks")
        .and_then(|h| h.get(HOOK_EVENT))
        .map(|v| !is_vacant(v))
        .unwrap_or(false)
}

/// Command of the first hook under the event, if any.
pub fn installed_command(doc: &Value) -> Option<String> {
    doc.get("hooks")
        .and_then(|h| h.get(HOOK_EVENT))
        .and_then(|rules| rules.as_array())
        .and_then(|rules| rules.first())
        .and_then(|rule| rule.get("hooks"))
        .and_then(|hooks| hooks.as_array())
        .and_then(|hooks| hooks.first())
        .and_then(|hook| hook.get("command"))
        .and_then(|command| command.as_str())
        .map(|s| s.to_string())
}

/// Register the hook in the settings file at `path`, creating it if absent.
/// A pre-existing event section is never overwritten.
pub fn install(path: &Path, reg: &Value) -> Result<MergeOutcome, SetupError> {
    let doc = load(path)?.unwrap_or_else(|| Value::Object(Map::new()));
    let (doc, outcome) = mutate(doc, &HookOp::Install(reg.clone())).map_err(|e| e.at(path))?;
    if outcome == MergeOutcome::Installed {
        save(path, &doc)?;
    }
    Ok(outcome)
}

/// Remove the hook registration. Absent file or absent section is a no-op.
pub fn uninstall(path: &Path) -> Result<MergeOutcome, SetupError> {
    let Some(doc) = load(path)? else {
        return Ok(MergeOutcome::NotPresent);
    };
    let (doc, outcome) = mutate(doc, &HookOp::Uninstall).map_err(|e| e.at(path))?;
    if outcome == MergeOutcome::Removed {
        save(path, &doc)?;
    }
    Ok(outcome)
}

/// Read and parse the settings file. `Ok(None)` when it does not exist;
/// a blank file reads as an empty document.
pub fn load(path: &Path) -> Result<Option<Value>, SetupError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SetupError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(Some(Value::Object(Map::new())));
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| SetupError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn save(path: &Path, doc: &Value) -> Result<(), SetupError> {
    let write_err = |source: anyhow::Error| SetupError::Write {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        let backup = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup) {
            eprintln!(
                "settings WARNING: failed to create backup {}: {}",
                backup.display(),
                e
            );
        }
    }

    let mut json = serde_json::to_string_pretty(doc).map_err(|e| write_err(e.into()))?;
    json.push('\n');
    AtomicWriter::new(WriteOptions::durable())
        .write_str(path, &json)
        .map_err(write_err)?;
    Ok(())
}
