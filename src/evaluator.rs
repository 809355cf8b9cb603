//! Path Permission Evaluator: given a resolved path and an operation,
//! decides allow/deny/ask against the rule store, the workspace boundary,
//! and the write-safety predicates.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSetBuilder};

use crate::context::ToolPermissionContext;
use crate::models::{Decision, Operation, Reason, RuleBehavior, Scope, Update};
use crate::path_resolver::{
    expand_symlinks, is_sensitive_path, is_suspicious_path, is_write_protected_path,
    strip_private_prefix,
};

/// Evaluates a single resolved path against the context for `op`.
pub fn check_path_permission(path: &Path, op: Operation, ctx: &ToolPermissionContext) -> Decision {
    let tool = op.rule_tool();

    if let Some(rule) = find_matching_rule(ctx, RuleBehavior::Deny, tool, path) {
        return Decision::deny(
            format!(
                "Permission to {} path '{}' has been denied.",
                op.verb(),
                path.display()
            ),
            Reason::Rule(rule),
        )
        .with_blocked_path(path.display().to_string());
    }

    if op != Operation::Read {
        if is_suspicious_path(&path.to_string_lossy()) {
            return Decision::ask(format!(
                "'{}' has a suspicious path shape",
                path.display()
            ))
            .with_blocked_path(path.display().to_string());
        }
        if is_write_protected_path(path, &ctx.project_dir, &ctx.home_dir) {
            return Decision::ask(format!(
                "'{}' is a sensitive file",
                path.display()
            ))
            .with_blocked_path(path.display().to_string());
        }
        if is_sensitive_path(path) {
            return Decision::ask(format!("'{}' is a sensitive path", path.display()))
                .with_blocked_path(path.display().to_string());
        }
    }

    if is_inside_workspace(path, ctx) {
        return Decision::allow();
    }

    if let Some(rule) = find_matching_rule(ctx, RuleBehavior::Allow, tool, path) {
        return Decision::allow_with_rule(rule);
    }

    let dirs: Vec<String> = ctx
        .workspace_dirs()
        .iter()
        .map(|d| d.display().to_string())
        .collect();
    let message = format!(
        "{tool} in '{}' was blocked. For security, this agent may only {} the allowed working directories for this session: {}.",
        path.display(),
        op.verb(),
        dirs.join(", ")
    );
    // A `/**` suffix matches descendants of a directory, not the directory
    // (or file) itself, so the suggested rule is rooted at the parent.
    let rule_root = path.parent().unwrap_or(path);
    let suggestion = Update::AddRules {
        destination: Scope::Session,
        behavior: RuleBehavior::Allow,
        rules: vec![format!("{tool}({}/**)", rule_root.display())],
    };
    Decision::ask_with_suggestions(message, vec![suggestion]).with_blocked_path(path.display().to_string())
}

/// A path is "inside a working directory" iff, after symlink expansion and
/// mac `/private/` normalization, it equals or descends from at least one
/// of `originalCwd ∪ additionalWorkingDirectories`. All variants (original
/// and realpath, if different) must pass for the overall check to pass.
fn is_inside_workspace(path: &Path, ctx: &ToolPermissionContext) -> bool {
    let variants = expand_symlinks(path);
    variants.iter().all(|variant| {
        let normalized = strip_private_prefix(variant);
        ctx.workspace_dirs().iter().any(|dir| {
            let dir = strip_private_prefix(dir);
            normalized == dir || normalized.starts_with(&dir)
        })
    })
}

fn find_matching_rule(
    ctx: &ToolPermissionContext,
    behavior: RuleBehavior,
    tool: &str,
    path: &Path,
) -> Option<String> {
    for (scope, rules) in ctx.rules_for(behavior) {
        for rule in rules {
            if rule_matches(rule, tool, path, *scope, ctx) {
                return Some(rule.clone());
            }
        }
    }
    None
}

fn rule_matches(
    rule: &str,
    tool: &str,
    path: &Path,
    scope: Scope,
    ctx: &ToolPermissionContext,
) -> bool {
    let Some(open) = rule.find('(') else {
        return rule == tool;
    };
    if !rule.ends_with(')') {
        return false;
    }
    let rule_tool = &rule[..open];
    if rule_tool != tool {
        return false;
    }
    let content = &rule[open + 1..rule.len() - 1];
    glob_matches(content, path, scope, ctx)
}

fn glob_matches(pattern: &str, path: &Path, scope: Scope, ctx: &ToolPermissionContext) -> bool {
    let root = scope_root(scope, ctx);
    let full_pattern = resolve_pattern(pattern, &root, &ctx.home_dir);

    let Ok(glob) = GlobBuilder::new(&full_pattern)
        .literal_separator(true)
        .build()
    else {
        return false;
    };
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    let Ok(set) = builder.build() else {
        return false;
    };
    set.is_match(path)
}

fn scope_root(scope: Scope, ctx: &ToolPermissionContext) -> PathBuf {
    match scope {
        Scope::UserSettings => ctx.home_dir.clone(),
        _ => ctx.project_dir.clone(),
    }
}

/// Rule content starting with `/` is absolute; `~/` is home-relative; `//`
/// is filesystem-root-absolute; `./` is dotted-relative; otherwise it is
/// relative to the scope root.
fn resolve_pattern(pattern: &str, root: &Path, home_dir: &Path) -> String {
    if let Some(rest) = pattern.strip_prefix("//") {
        return format!("/{rest}");
    }
    if pattern.starts_with('/') {
        return pattern.to_string();
    }
    if let Some(rest) = pattern.strip_prefix("~/") {
        return home_dir.join(rest).to_string_lossy().into_owned();
    }
    if let Some(rest) = pattern.strip_prefix("./") {
        return root.join(rest).to_string_lossy().into_owned();
    }
    root.join(pattern).to_string_lossy().into_owned()
}
