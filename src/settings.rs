//! Settings Persistence Adapter (read side): loads JSON settings per scope
//! from a primary path with legacy-path fallback.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::Scope;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Permissions {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub ask: Vec<String>,
    #[serde(default, rename = "additionalDirectories")]
    pub additional_directories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SettingsFile {
    #[serde(default)]
    pub permissions: Permissions,
    /// Top-level keys this crate doesn't model, preserved verbatim so a
    /// write doesn't clobber fields another tool owns.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The primary on-disk path for a persistable scope.
pub fn primary_path(scope: Scope, home_dir: &Path, project_dir: &Path) -> Option<PathBuf> {
    match scope {
        Scope::UserSettings => Some(home_dir.join(".claude").join("settings.json")),
        Scope::ProjectSettings => Some(project_dir.join(".claude").join("settings.json")),
        Scope::LocalSettings => Some(project_dir.join(".claude").join("settings.local.json")),
        _ => None,
    }
}

/// The legacy on-disk path for a persistable scope, checked when the
/// primary is absent and kept in sync on write.
pub fn legacy_path(scope: Scope, home_dir: &Path, project_dir: &Path) -> Option<PathBuf> {
    match scope {
        Scope::UserSettings => Some(home_dir.join(".kode").join("settings.json")),
        Scope::ProjectSettings => Some(project_dir.join(".kode").join("settings.json")),
        Scope::LocalSettings => Some(project_dir.join(".kode").join("settings.local.json")),
        _ => None,
    }
}

/// Loads a single scope's settings file, preferring the primary path and
/// falling back to the legacy path. Returns an empty `SettingsFile` if
/// neither exists or parsing fails — settings I/O failures are not fatal
/// (spec's `IO failure` taxonomy: the engine degrades to "no rules here").
pub fn load_scope(scope: Scope, home_dir: &Path, project_dir: &Path) -> SettingsFile {
    if let Some(primary) = primary_path(scope, home_dir, project_dir) {
        if let Ok(settings) = load_file(&primary) {
            return settings;
        }
    }
    if let Some(legacy) = legacy_path(scope, home_dir, project_dir) {
        if let Ok(settings) = load_file(&legacy) {
            return settings;
        }
    }
    SettingsFile::default()
}

pub fn load_file(path: &Path) -> Result<SettingsFile, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let settings: SettingsFile = serde_json::from_str(&content)?;
    Ok(settings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsDecision {
    Allow,
    Deny,
    Ask,
    NoMatch,
}

/// Checks a command string against a scope's Bash rule lists.
/// Priority: deny > ask > allow.
pub fn check_command(permissions: &Permissions, command: &str) -> SettingsDecision {
    if matches_any(&permissions.deny, command) {
        return SettingsDecision::Deny;
    }
    if matches_any(&permissions.ask, command) {
        return SettingsDecision::Ask;
    }
    if matches_any(&permissions.allow, command) {
        return SettingsDecision::Allow;
    }
    SettingsDecision::NoMatch
}

fn matches_any(patterns: &[String], command: &str) -> bool {
    patterns.iter().any(|pattern| {
        pattern
            .strip_prefix("Bash(")
            .and_then(|p| p.strip_suffix(')'))
            .map(|inner| matches_bash_pattern(inner, command))
            .unwrap_or(false)
    })
}

/// Matches a `Bash(...)` rule's content against a command:
/// - `cmd:*` — word-boundary prefix match (`git:*` matches `git`, `git status`).
/// - `cmd*` — glob-prefix match (`cat /dev/zero*` matches anything starting
///   with that literal text).
/// - `cmd` — exact match.
///
/// A trailing `[background]` marker is stripped from the pattern before
/// matching; it only affects how the UI labels the rule.
pub fn matches_bash_pattern(pattern: &str, command: &str) -> bool {
    let pattern = pattern.trim_end_matches("[background]").trim_end();
    let command = if cfg!(windows) {
        command.to_lowercase()
    } else {
        command.to_string()
    };
    let pattern_cmp = if cfg!(windows) {
        pattern.to_lowercase()
    } else {
        pattern.to_string()
    };

    if let Some(prefix) = pattern_cmp.strip_suffix(":*") {
        command == prefix || command.starts_with(&format!("{prefix} "))
    } else if let Some(prefix) = pattern_cmp.strip_suffix('*') {
        command.starts_with(prefix)
    } else {
        command == pattern_cmp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_match() {
        assert!(matches_bash_pattern("git:*", "git"));
        assert!(matches_bash_pattern("git:*", "git status"));
        assert!(matches_bash_pattern("git:*", "git push origin main"));
        assert!(!matches_bash_pattern("git:*", "gitk"));
        assert!(!matches_bash_pattern("git:*", "github"));
    }

    #[test]
    fn test_exact_match() {
        assert!(matches_bash_pattern("pwd", "pwd"));
        assert!(!matches_bash_pattern("pwd", "pwd -L"));
        assert!(!matches_bash_pattern("pwd", "pwdx"));
    }

    #[test]
    fn test_glob_match() {
        assert!(matches_bash_pattern("cat /dev/zero*", "cat /dev/zero"));
        assert!(matches_bash_pattern(
            "cat /dev/zero*",
            "cat /dev/zero | head"
        ));
        assert!(!matches_bash_pattern("cat /dev/zero*", "cat /dev/random"));
    }

    #[test]
    fn test_background_marker_stripped() {
        assert!(matches_bash_pattern("npm run dev:* [background]", "npm run dev watch"));
    }

    #[test]
    fn test_check_command_priority() {
        let permissions = Permissions {
            deny: vec!["Bash(rm -rf /)".to_string()],
            ask: vec!["Bash(rm:*)".to_string()],
            allow: vec!["Bash(ls:*)".to_string()],
            additional_directories: vec![],
        };

        assert_eq!(check_command(&permissions, "rm -rf /"), SettingsDecision::Deny);
        assert_eq!(check_command(&permissions, "rm file.txt"), SettingsDecision::Ask);
        assert_eq!(check_command(&permissions, "ls -la"), SettingsDecision::Allow);
        assert_eq!(check_command(&permissions, "foo"), SettingsDecision::NoMatch);
    }

    #[test]
    fn test_load_missing_scope_returns_empty() {
        let settings = load_scope(
            Scope::ProjectSettings,
            Path::new("/nonexistent/home"),
            Path::new("/nonexistent/project"),
        );
        assert!(settings.permissions.allow.is_empty());
    }
}
