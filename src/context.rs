//! `ToolPermissionContext`: the in-memory rule store threaded explicitly
//! through every entry point, built by merging on-disk settings across the
//! persistable scopes and mutated only by applying `Update`s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{Mode, RuleBehavior, Scope, Update};
use crate::settings;

#[derive(Debug, Clone, Default)]
pub struct ToolPermissionContext {
    pub mode: Mode,
    pub original_cwd: PathBuf,
    pub project_dir: PathBuf,
    pub home_dir: PathBuf,
    pub always_allow_rules: BTreeMap<Scope, Vec<String>>,
    pub always_deny_rules: BTreeMap<Scope, Vec<String>>,
    pub always_ask_rules: BTreeMap<Scope, Vec<String>>,
    pub additional_working_directories: BTreeMap<PathBuf, Scope>,
    pub is_bypass_permissions_mode_available: bool,
}

pub struct LoadOptions {
    pub project_dir: PathBuf,
    pub home_dir: PathBuf,
    pub include_project_overrides: bool,
    pub bypass_available: bool,
}

/// Merges on-disk settings across the three persistable scopes into a fresh
/// `ToolPermissionContext`. `projectDir` doubles as `originalCwd`.
pub fn load_permission_context(opts: LoadOptions) -> ToolPermissionContext {
    let mut ctx = ToolPermissionContext {
        mode: Mode::Default,
        original_cwd: opts.project_dir.clone(),
        project_dir: opts.project_dir.clone(),
        home_dir: opts.home_dir.clone(),
        is_bypass_permissions_mode_available: opts.bypass_available,
        ..Default::default()
    };

    let user = settings::load_scope(Scope::UserSettings, &opts.home_dir, &opts.project_dir);
    insert_scope_rules(&mut ctx, Scope::UserSettings, &user);

    if opts.include_project_overrides {
        let project =
            settings::load_scope(Scope::ProjectSettings, &opts.home_dir, &opts.project_dir);
        insert_scope_rules(&mut ctx, Scope::ProjectSettings, &project);

        let local = settings::load_scope(Scope::LocalSettings, &opts.home_dir, &opts.project_dir);
        insert_scope_rules(&mut ctx, Scope::LocalSettings, &local);
    }

    ctx
}

fn insert_scope_rules(ctx: &mut ToolPermissionContext, scope: Scope, file: &settings::SettingsFile) {
    ctx.always_allow_rules
        .insert(scope, file.permissions.allow.clone());
    ctx.always_deny_rules
        .insert(scope, file.permissions.deny.clone());
    ctx.always_ask_rules
        .insert(scope, file.permissions.ask.clone());
    for dir in &file.permissions.additional_directories {
        if let Ok(resolved) = crate::path_resolver::resolve(dir, Some(&ctx.project_dir)) {
            ctx.additional_working_directories.insert(resolved, scope);
        }
    }
}

impl ToolPermissionContext {
    pub fn workspace_dirs(&self) -> Vec<&Path> {
        std::iter::once(self.original_cwd.as_path())
            .chain(self.additional_working_directories.keys().map(|p| p.as_path()))
            .collect()
    }

    pub fn rules_for(&self, behavior: RuleBehavior) -> impl Iterator<Item = (&Scope, &Vec<String>)> {
        let map = match behavior {
            RuleBehavior::Allow => &self.always_allow_rules,
            RuleBehavior::Deny => &self.always_deny_rules,
            RuleBehavior::Ask => &self.always_ask_rules,
        };
        map.iter()
    }

    fn rules_mut(&mut self, behavior: RuleBehavior) -> &mut BTreeMap<Scope, Vec<String>> {
        match behavior {
            RuleBehavior::Allow => &mut self.always_allow_rules,
            RuleBehavior::Deny => &mut self.always_deny_rules,
            RuleBehavior::Ask => &mut self.always_ask_rules,
        }
    }
}

/// Pure application of a batch of updates to a context, returning a new
/// context. `addRules` merges unique, `replaceRules` overwrites the set,
/// `removeRules` filters. Directory updates merge/filter similarly.
/// `setMode` is always applied in-memory regardless of destination
/// persistability.
pub fn apply_updates(ctx: &ToolPermissionContext, updates: &[Update]) -> ToolPermissionContext {
    let mut next = ctx.clone();
    for update in updates {
        match update {
            Update::AddRules {
                destination,
                behavior,
                rules,
            } => {
                let entry = next.rules_mut(*behavior).entry(*destination).or_default();
                for rule in rules {
                    if !entry.contains(rule) {
                        entry.push(rule.clone());
                    }
                }
            }
            Update::ReplaceRules {
                destination,
                behavior,
                rules,
            } => {
                next.rules_mut(*behavior).insert(*destination, rules.clone());
            }
            Update::RemoveRules {
                destination,
                behavior,
                rules,
            } => {
                if let Some(entry) = next.rules_mut(*behavior).get_mut(destination) {
                    entry.retain(|r| !rules.contains(r));
                }
            }
            Update::AddDirectories {
                destination,
                directories,
            } => {
                for dir in directories {
                    if let Ok(resolved) = crate::path_resolver::resolve(dir, Some(&next.project_dir)) {
                        next.additional_working_directories
                            .insert(resolved, *destination);
                    }
                }
            }
            Update::RemoveDirectories {
                destination: _,
                directories,
            } => {
                for dir in directories {
                    if let Ok(resolved) = crate::path_resolver::resolve(dir, Some(&next.project_dir)) {
                        next.additional_working_directories.remove(&resolved);
                    }
                }
            }
            Update::SetMode { mode, .. } => {
                next.mode = *mode;
            }
        }
    }
    next
}

/// Persists a single update to disk (for persistable destinations) and
/// returns whether the write succeeded. Non-persistable destinations (and
/// `setMode`, which is always in-memory-only) return `persisted: false`
/// without attempting I/O.
pub fn persist_update(update: &Update, project_dir: &Path, home_dir: &Path) -> bool {
    let destination = match update {
        Update::AddRules { destination, .. }
        | Update::ReplaceRules { destination, .. }
        | Update::RemoveRules { destination, .. }
        | Update::AddDirectories { destination, .. }
        | Update::RemoveDirectories { destination, .. } => Some(*destination),
        Update::SetMode { .. } => None,
    };

    let Some(destination) = destination else {
        return false;
    };
    if !destination.is_persistable() {
        return false;
    }

    crate::settings_writer::persist(update, destination, project_dir, home_dir).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ctx() -> ToolPermissionContext {
        ToolPermissionContext {
            original_cwd: PathBuf::from("/work/proj"),
            project_dir: PathBuf::from("/work/proj"),
            home_dir: PathBuf::from("/home/user"),
            ..Default::default()
        }
    }

    #[test]
    fn add_then_remove_same_rule_is_noop() {
        let ctx = empty_ctx();
        let add = Update::AddRules {
            destination: Scope::Session,
            behavior: RuleBehavior::Allow,
            rules: vec!["Bash(ls:*)".to_string()],
        };
        let remove = Update::RemoveRules {
            destination: Scope::Session,
            behavior: RuleBehavior::Allow,
            rules: vec!["Bash(ls:*)".to_string()],
        };
        let result = apply_updates(&ctx, &[add, remove]);
        assert!(result
            .always_allow_rules
            .get(&Scope::Session)
            .map(|v| v.is_empty())
            .unwrap_or(true));
    }

    #[test]
    fn add_rules_deduplicates() {
        let ctx = empty_ctx();
        let add = Update::AddRules {
            destination: Scope::Session,
            behavior: RuleBehavior::Allow,
            rules: vec!["Bash(ls:*)".to_string(), "Bash(ls:*)".to_string()],
        };
        let result = apply_updates(&ctx, &[add]);
        assert_eq!(
            result.always_allow_rules.get(&Scope::Session).unwrap().len(),
            1
        );
    }

    #[test]
    fn set_mode_updates_in_memory() {
        let ctx = empty_ctx();
        let update = Update::SetMode {
            destination: Scope::Session,
            mode: Mode::AcceptEdits,
        };
        let result = apply_updates(&ctx, &[update]);
        assert_eq!(result.mode, Mode::AcceptEdits);
    }
}
