//! Path normalization and the suspicion/sensitivity/write-protection
//! predicates the write-safety check in `evaluator` relies on.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    NullByte,
    Empty,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NullByte => write!(f, "path contains a null byte"),
            ResolveError::Empty => write!(f, "path is empty"),
        }
    }
}

impl std::error::Error for ResolveError {}

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const SENSITIVE_DIR_SEGMENTS: &[&str] = &[".git", ".vscode", ".idea", ".ssh", ".claude", ".kode"];

const SENSITIVE_BASENAMES: &[&str] = &[
    ".gitconfig",
    ".gitmodules",
    ".bashrc",
    ".bash_profile",
    ".zshrc",
    ".zprofile",
    ".profile",
    ".ripgreprc",
    ".mcp.json",
];

/// Expands `~`/`~/`, rewrites Windows `/c/foo` style paths, resolves
/// relative paths against `base`, trims whitespace, and rejects null bytes.
/// Never touches the filesystem.
pub fn resolve(input: &str, base: Option<&Path>) -> Result<PathBuf, ResolveError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::Empty);
    }
    if trimmed.contains('\0') {
        return Err(ResolveError::NullByte);
    }

    let expanded = expand_tilde(trimmed);
    let expanded = rewrite_windows_drive(&expanded);

    let path = Path::new(&expanded);
    if path.is_absolute() {
        return Ok(normalize(path));
    }

    let base = base
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"));
    Ok(normalize(&base.join(path)))
}

fn expand_tilde(input: &str) -> String {
    if input == "~" {
        return dirs::home_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string());
    }
    if let Some(rest) = input.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    input.to_string()
}

/// `/c/foo` -> `C:\foo`, mirroring Git-Bash-style path mangling on Windows.
fn rewrite_windows_drive(input: &str) -> String {
    let bytes = input.as_bytes();
    if bytes.len() >= 3
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && (bytes.len() == 2 || bytes[2] == b'/')
    {
        let drive = bytes[1].to_ascii_uppercase() as char;
        let rest = &input[2..];
        return format!("{drive}:{}", rest.replace('/', "\\"));
    }
    input.to_string()
}

/// Collapses `.`/`..` segments lexically (no filesystem access).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component::*;
        match component {
            CurDir => {}
            ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns `[original]` if the path doesn't exist, else `[original, realpath]`.
pub fn expand_symlinks(path: &Path) -> Vec<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(real) if real != path => vec![path.to_path_buf(), real],
        _ => vec![path.to_path_buf()],
    }
}

/// macOS aliases `/tmp`, `/var`, `/etc` under `/private`; treat them as the
/// same path for workspace/boundary comparisons.
pub fn strip_private_prefix(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("/private") {
        if rest.starts_with("var") || rest.starts_with("tmp") || rest.starts_with("etc") {
            return Path::new("/").join(rest);
        }
    }
    path.to_path_buf()
}

/// Rejects malformed/obfuscated path shapes: alternate-stream-like second
/// colons, 8.3 short names, UNC device prefixes, trailing dot/whitespace,
/// reserved device names, triple-dot segments, and suspicious UNC forms.
pub fn is_suspicious_path(path: &str) -> bool {
    if let Some(first_colon) = path.find(':') {
        if path[first_colon + 1..].contains(':') {
            return true;
        }
    }
    if path.len() > 1 {
        for segment in path.split(['/', '\\']) {
            if segment.len() > 1 && segment.starts_with('~') && segment[1..].chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    for prefix in ["\\\\?\\", "\\\\.\\", "//?/", "//./"] {
        if path.starts_with(prefix) {
            return true;
        }
    }
    if path.ends_with('.') || path.ends_with(' ') || path.ends_with('\t') {
        return true;
    }
    for segment in path.split(['/', '\\']) {
        let name = segment.split('.').next().unwrap_or(segment);
        if RESERVED_DEVICE_NAMES
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
        {
            return true;
        }
        if segment.contains("...") {
            return true;
        }
    }
    if path.starts_with("\\\\") || path.starts_with("//") {
        if path.contains("@SSL") || path.contains("DavWWWRoot") {
            return true;
        }
        if path.contains('[') && path.contains(']') {
            return true; // IPv6-bracketed UNC
        }
        let host = path
            .trim_start_matches(['\\', '/'])
            .split(['/', '\\'])
            .next()
            .unwrap_or("");
        if host.split('.').count() == 4 && host.split('.').all(|p| p.parse::<u8>().is_ok()) {
            return true; // numeric-IP UNC
        }
    }
    false
}

/// True if any path segment (case-insensitive) names a sensitive directory,
/// or the basename matches a sensitive dotfile.
pub fn is_sensitive_path(path: &Path) -> bool {
    for component in path.components() {
        let s = component.as_os_str().to_string_lossy();
        if SENSITIVE_DIR_SEGMENTS
            .iter()
            .any(|seg| seg.eq_ignore_ascii_case(&s))
        {
            return true;
        }
    }
    if let Some(name) = path.file_name() {
        let name = name.to_string_lossy();
        if SENSITIVE_BASENAMES
            .iter()
            .any(|b| b.eq_ignore_ascii_case(&name))
        {
            return true;
        }
    }
    let s = path.to_string_lossy();
    s.starts_with("\\\\") || s.starts_with("//")
}

/// True for a path inside any persistable settings scope's directory, or
/// the agent's own command/agent/skill trees.
pub fn is_write_protected_path(path: &Path, project_dir: &Path, home_dir: &Path) -> bool {
    let candidates = [
        home_dir.join(".claude").join("settings.json"),
        home_dir.join(".kode").join("settings.json"),
        project_dir.join(".claude").join("settings.json"),
        project_dir.join(".claude").join("settings.local.json"),
        project_dir.join(".kode").join("settings.json"),
        project_dir.join(".kode").join("settings.local.json"),
    ];
    if candidates.iter().any(|c| c == path) {
        return true;
    }
    for root in [".claude", ".kode"] {
        for sub in ["commands", "agents", "skills"] {
            if path.starts_with(project_dir.join(root).join(sub)) {
                return true;
            }
        }
    }
    false
}
