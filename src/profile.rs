//! Marker + alias block in the user's shell startup file.

use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::VIEWER_NAME;
use crate::error::SetupError;
use crate::write_core::{AtomicWriter, WriteOptions};

lazy_static! {
    static ref ALIAS_LINE: Regex =
        Regex::new(&format!(r"^\s*alias\s+{}=", regex::escape(VIEWER_NAME)))
            .expect("alias pattern is a valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Added,
    AlreadyPresent,
    /// Number of lines dropped.
    Removed(usize),
    NotPresent,
    /// The profile file does not exist; nothing to patch.
    NoProfile,
}

/// Keep every line for which `pred` is false, in order. Lines keep their endings.
pub fn remove_matching<'a, F>(lines: &[&'a str], pred: F) -> Vec<&'a str>
where
    F: Fn(&str) -> bool,
{
    lines
        .iter()
        .copied()
        .filter(|line| !pred(strip_ending(line)))
        .collect()
}

/// True for a whole line that defines the viewer alias.
pub fn is_alias_line(line: &str) -> bool {
    ALIAS_LINE.is_match(line)
}

fn strip_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Content after appending the block, or `None` when a live alias line is
/// already there. Commented-out definitions don't count.
pub fn with_alias(content: &str, marker: &str, alias_line: &str) -> Option<String> {
    if content.lines().any(is_alias_line) {
        return None;
    }
    let mut out = String::with_capacity(content.len() + marker.len() + alias_line.len() + 4);
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(marker);
    out.push('\n');
    out.push_str(alias_line);
    out.push('\n');
    Some(out)
}

/// Content with every marker and alias line dropped, plus how many were dropped.
pub fn without_alias(content: &str, marker: &str) -> (String, usize) {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let kept = remove_matching(&lines, |line| line.trim_end() == marker || is_alias_line(line));
    let removed = lines.len() - kept.len();
    (kept.concat(), removed)
}

/// Append the marker and alias lines to `path` unless the alias is already defined.
pub fn add_alias(path: &Path, marker: &str, alias_line: &str) -> Result<PatchOutcome, SetupError> {
    let Some(content) = read(path)? else {
        return Ok(PatchOutcome::NoProfile);
    };
    match with_alias(&content, marker, alias_line) {
        Some(patched) => {
            write(path, &patched)?;
            Ok(PatchOutcome::Added)
        }
        None => Ok(PatchOutcome::AlreadyPresent),
    }
}

/// Drop every marker line and every alias line from `path`; other lines are untouched.
pub fn remove_alias(path: &Path, marker: &str) -> Result<PatchOutcome, SetupError> {
    let Some(content) = read(path)? else {
        return Ok(PatchOutcome::NoProfile);
    };
    let (patched, removed) = without_alias(&content, marker);
    if removed == 0 {
        return Ok(PatchOutcome::NotPresent);
    }
    write(path, &patched)?;
    Ok(PatchOutcome::Removed(removed))
}

/// Whether `path` currently defines the alias.
pub fn has_alias(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|content| content.lines().any(is_alias_line))
        .unwrap_or(false)
}

fn read(path: &Path) -> Result<Option<String>, SetupError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SetupError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write(path: &Path, content: &str) -> Result<(), SetupError> {
    AtomicWriter::new(WriteOptions::durable())
        .write_str(path, content)
        .map(|_| ())
        .map_err(|source| SetupError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALIAS_MARKER;
    use tempfile::TempDir;

    const ALIAS: &str = "alias claude-stats=\"/home/u/.claude/hooks/claude-stats\"";

    #[test]
    fn remove_matching_keeps_order_of_survivors() {
        let lines = ["a\n", "drop\n", "b\n", "drop\n", "c"];
        let kept = remove_matching(&lines, |l| l == "drop");
        assert_eq!(kept, ["a\n", "b\n", "c"]);
    }

    #[test]
    fn remove_matching_compares_without_line_ending() {
        let lines = ["keep\r\n", "drop\r\n"];
        assert_eq!(remove_matching(&lines, |l| l == "drop"), ["keep\r\n"]);
    }

    #[test]
    fn alias_line_match_is_whole_line_prefix() {
        assert!(is_alias_line(ALIAS));
        assert!(is_alias_line("  alias claude-stats='x'"));
        assert!(!is_alias_line("alias claude-stats-old=\"x\""));
        assert!(!is_alias_line("echo alias claude-stats=x"));
        assert!(!is_alias_line("# alias claude-stats=x"));
    }

    #[test]
    fn with_alias_appends_separator_marker_and_alias() {
        let out = with_alias("export A=1\n", ALIAS_MARKER, ALIAS).unwrap();
        assert_eq!(
            out,
            format!("export A=1\n\n{}\n{}\n", ALIAS_MARKER, ALIAS)
        );
    }

    #[test]
    fn with_alias_terminates_unterminated_last_line() {
        let out = with_alias("export A=1", ALIAS_MARKER, ALIAS).unwrap();
        assert!(out.starts_with("export A=1\n\n# Claude Code token stats\n"));
    }

    #[test]
    fn with_alias_skips_when_alias_defined_with_other_target() {
        let content = "alias claude-stats=\"/opt/elsewhere\"\n";
        assert_eq!(with_alias(content, ALIAS_MARKER, ALIAS), None);
    }

    #[test]
    fn with_alias_ignores_commented_out_definition() {
        let content = "# alias claude-stats=\"/old/path\"\n";
        let out = with_alias(content, ALIAS_MARKER, ALIAS).unwrap();
        assert!(out.ends_with(&format!("{}\n", ALIAS)));
        assert!(out.lines().any(is_alias_line));
    }

    #[test]
    fn without_alias_removes_exactly_block_lines() {
        let original = "export A=1\nalias ll='ls -l'\n";
        let patched = with_alias(original, ALIAS_MARKER, ALIAS).unwrap();
        let (restored, removed) = without_alias(&patched, ALIAS_MARKER);
        assert_eq!(removed, 2);
        // the blank separator stays; only marker and alias go
        assert_eq!(restored, "export A=1\nalias ll='ls -l'\n\n");
    }

    #[test]
    fn without_alias_leaves_lines_mentioning_marker_text() {
        let content = "echo '# Claude Code token stats'\n# Claude Code token stats extra\n";
        let (out, removed) = without_alias(content, ALIAS_MARKER);
        assert_eq!(removed, 0);
        assert_eq!(out, content);
    }

    #[test]
    fn without_alias_removes_duplicates_anywhere() {
        let content = format!(
            "{m}\n{a}\nexport B=2\n{m}\n{a}\n",
            m = ALIAS_MARKER,
            a = ALIAS
        );
        let (out, removed) = without_alias(&content, ALIAS_MARKER);
        assert_eq!(removed, 4);
        assert_eq!(out, "export B=2\n");
    }

    #[test]
    fn add_alias_absent_profile_is_noop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".zshrc");
        assert_eq!(
            add_alias(&path, ALIAS_MARKER, ALIAS).unwrap(),
            PatchOutcome::NoProfile
        );
        assert!(!path.exists());
    }

    #[test]
    fn add_alias_twice_adds_one_block() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".bashrc");
        fs::write(&path, "export PATH=$PATH:~/bin\n").unwrap();

        assert_eq!(
            add_alias(&path, ALIAS_MARKER, ALIAS).unwrap(),
            PatchOutcome::Added
        );
        assert_eq!(
            add_alias(&path, ALIAS_MARKER, ALIAS).unwrap(),
            PatchOutcome::AlreadyPresent
        );

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(ALIAS_MARKER).count(), 1);
        assert_eq!(content.matches("alias claude-stats=").count(), 1);
        assert!(has_alias(&path));
    }

    #[test]
    fn remove_alias_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".zshrc");
        fs::write(&path, "setopt autocd\n").unwrap();

        add_alias(&path, ALIAS_MARKER, ALIAS).unwrap();
        assert_eq!(
            remove_alias(&path, ALIAS_MARKER).unwrap(),
            PatchOutcome::Removed(2)
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "setopt autocd\n\n");
        assert!(!has_alias(&path));

        assert_eq!(
            remove_alias(&path, ALIAS_MARKER).unwrap(),
            PatchOutcome::NotPresent
        );
    }

    #[cfg(unix)]
    #[test]
    fn patches_symlinked_profile_in_place() {
        use std::os::unix::fs::symlink;
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("dotfiles_zshrc");
        fs::write(&real, "setopt autocd\n").unwrap();
        let link = tmp.path().join(".zshrc");
        symlink(&real, &link).unwrap();

        assert_eq!(
            add_alias(&link, ALIAS_MARKER, ALIAS).unwrap(),
            PatchOutcome::Added
        );
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(has_alias(&real));

        assert_eq!(
            remove_alias(&link, ALIAS_MARKER).unwrap(),
            PatchOutcome::Removed(2)
        );
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "setopt autocd\n\n");
    }

    #[test]
    fn remove_alias_absent_profile_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            remove_alias(&tmp.path().join(".zshrc"), ALIAS_MARKER).unwrap(),
            PatchOutcome::NoProfile
        );
    }
}
