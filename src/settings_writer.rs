//! Settings Persistence Adapter (write side): persists `Update`s to the
//! primary settings file for a scope and mirrors the write to the legacy
//! path if one exists. No file locking — the agent is the sole writer to
//! its own settings files, so a plain read-modify-write is sufficient.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use crate::models::{RuleBehavior, Scope, Update};
use crate::settings::{legacy_path, primary_path};

pub fn persist(
    update: &Update,
    destination: Scope,
    project_dir: &Path,
    home_dir: &Path,
) -> std::io::Result<()> {
    let Some(primary) = primary_path(destination, home_dir, project_dir) else {
        return Ok(());
    };

    apply_to_file(&primary, update)?;

    if let Some(legacy) = legacy_path(destination, home_dir, project_dir) {
        if legacy.exists() {
            apply_to_file(&legacy, update)?;
        }
    }

    Ok(())
}

fn apply_to_file(path: &Path, update: &Update) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut doc = read_json(path);
    ensure_permissions_object(&mut doc);
    let permissions = doc.get_mut("permissions").unwrap();

    match update {
        Update::AddRules { behavior, rules, .. } => {
            let key = rule_key(*behavior);
            let arr = rule_array(permissions, key);
            for rule in rules {
                if !arr.iter().any(|v| v.as_str() == Some(rule)) {
                    arr.push(json!(rule));
                }
            }
        }
        Update::ReplaceRules { behavior, rules, .. } => {
            let key = rule_key(*behavior);
            permissions[key] = json!(dedup(rules));
        }
        Update::RemoveRules { behavior, rules, .. } => {
            let key = rule_key(*behavior);
            let arr = rule_array(permissions, key);
            arr.retain(|v| !rules.iter().any(|r| v.as_str() == Some(r.as_str())));
        }
        Update::AddDirectories { directories, .. } => {
            let arr = rule_array(permissions, "additionalDirectories");
            for dir in directories {
                if !arr.iter().any(|v| v.as_str() == Some(dir)) {
                    arr.push(json!(dir));
                }
            }
        }
        Update::RemoveDirectories { directories, .. } => {
            let arr = rule_array(permissions, "additionalDirectories");
            arr.retain(|v| !directories.iter().any(|d| v.as_str() == Some(d.as_str())));
        }
        Update::SetMode { .. } => {
            // setMode is always in-memory/session-only; nothing to persist.
            return Ok(());
        }
    }

    let rendered = serde_json::to_string_pretty(&doc)? + "\n";
    fs::write(path, rendered)
}

fn read_json(path: &Path) -> Value {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| json!({}))
}

fn ensure_permissions_object(doc: &mut Value) {
    if !doc.is_object() {
        *doc = json!({});
    }
    if doc.get("permissions").and_then(|v| v.as_object()).is_none() {
        doc["permissions"] = json!({});
    }
}

fn rule_array<'a>(permissions: &'a mut Value, key: &str) -> &'a mut Vec<Value> {
    if permissions.get(key).and_then(|v| v.as_array()).is_none() {
        permissions[key] = json!([]);
    }
    permissions[key].as_array_mut().unwrap()
}

fn rule_key(behavior: RuleBehavior) -> &'static str {
    match behavior {
        RuleBehavior::Allow => "allow",
        RuleBehavior::Deny => "deny",
        RuleBehavior::Ask => "ask",
    }
}

fn dedup(rules: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(rules.len());
    for rule in rules {
        if !out.contains(rule) {
            out.push(rule.clone());
        }
    }
    out
}
