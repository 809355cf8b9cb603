//! Core types shared across the permission engine: the decision vocabulary,
//! the rule-update vocabulary, and the hook JSON contract used by the CLI
//! entry point.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed simple command: the executable and its arguments, plus the raw
/// text it was extracted from.
#[derive(Debug, Clone, Default)]
pub struct CommandInfo {
    /// Original text this command was extracted from (may be a whole
    /// command or a single subcommand after splitting).
    pub raw: String,
    /// The executable (`grep`, `aws`, `rm`, ...), with any path prefix
    /// stripped (`/usr/bin/cat` -> `cat`).
    pub program: String,
    /// Arguments after the program name.
    pub args: Vec<String>,
}

impl CommandInfo {
    pub fn new(raw: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            raw: raw.into(),
            program: program.into(),
            args,
        }
    }
}

/// Final or intermediate behavior for a tool-use decision.
///
/// `Passthrough` is internal: it means "no opinion yet" and is always
/// resolved to `Ask` or `Allow` by the orchestrator before it leaves the
/// crate's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Behavior {
    Passthrough = 0,
    Allow = 1,
    Ask = 2,
    Deny = 3,
}

/// The operation being evaluated for a filesystem path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Edit,
    Create,
}

impl Operation {
    /// The rule tool name a deny/allow rule must carry to apply to this
    /// operation (`Read` rules gate reads; `Edit` rules gate everything
    /// that writes).
    pub fn rule_tool(self) -> &'static str {
        match self {
            Operation::Read => "Read",
            Operation::Edit | Operation::Create => "Edit",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Edit => "edit",
            Operation::Create => "create",
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone)]
pub enum Reason {
    /// An explicit rule string matched.
    Rule(String),
    /// Free-text explanation (injection screen, boundary check, ...).
    Other(String),
    /// Aggregated per-subcommand results for a compound bash command.
    Subcommands(BTreeMap<String, Decision>),
}

/// A persistable or ephemeral configuration source. Ordered from most to
/// least specific for suggestion generation (matching does not depend on
/// this order — deny beats ask beats allow regardless of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    UserSettings,
    ProjectSettings,
    LocalSettings,
    PolicySettings,
    FlagSettings,
    CliArg,
    Command,
    Session,
}

impl Scope {
    /// The three scopes that are backed by an on-disk settings file.
    pub fn is_persistable(self) -> bool {
        matches!(
            self,
            Scope::UserSettings | Scope::ProjectSettings | Scope::LocalSettings
        )
    }
}

/// Session-wide policy modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    Default,
    AcceptEdits,
    Plan,
    DontAsk,
    BypassPermissions,
}

/// A proposed mutation to the permission context, surfaced to the user
/// alongside an `ask` decision so they can persist it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Update {
    AddRules {
        destination: Scope,
        behavior: RuleBehavior,
        rules: Vec<String>,
    },
    ReplaceRules {
        destination: Scope,
        behavior: RuleBehavior,
        rules: Vec<String>,
    },
    RemoveRules {
        destination: Scope,
        behavior: RuleBehavior,
        rules: Vec<String>,
    },
    AddDirectories {
        destination: Scope,
        directories: Vec<String>,
    },
    RemoveDirectories {
        destination: Scope,
        directories: Vec<String>,
    },
    SetMode {
        destination: Scope,
        mode: Mode,
    },
}

/// The behavior a rule set enforces (distinct from `Behavior` because a
/// rule can never itself resolve to `Passthrough`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleBehavior {
    Allow,
    Deny,
    Ask,
}

/// The outcome of a permission check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub behavior: Behavior,
    pub message: Option<String>,
    pub reason: Option<Reason>,
    pub blocked_path: Option<String>,
    pub suggestions: Vec<Update>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            behavior: Behavior::Allow,
            message: None,
            reason: None,
            blocked_path: None,
            suggestions: Vec::new(),
        }
    }

    pub fn allow_with_rule(rule: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Allow,
            message: None,
            reason: Some(Reason::Rule(rule.into())),
            blocked_path: None,
            suggestions: Vec::new(),
        }
    }

    pub fn deny(message: impl Into<String>, reason: Reason) -> Self {
        Self {
            behavior: Behavior::Deny,
            message: Some(message.into()),
            reason: Some(reason),
            blocked_path: None,
            suggestions: Vec::new(),
        }
    }

    pub fn ask(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Ask,
            message: Some(message.into()),
            reason: Some(Reason::Other(String::new())),
            blocked_path: None,
            suggestions: Vec::new(),
        }
    }

    pub fn ask_with_suggestions(message: impl Into<String>, suggestions: Vec<Update>) -> Self {
        Self {
            behavior: Behavior::Ask,
            message: Some(message.into()),
            reason: Some(Reason::Other(String::new())),
            blocked_path: None,
            suggestions,
        }
    }

    pub fn passthrough() -> Self {
        Self {
            behavior: Behavior::Passthrough,
            message: None,
            reason: None,
            blocked_path: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_blocked_path(mut self, path: impl Into<String>) -> Self {
        self.blocked_path = Some(path.into());
        self
    }

    pub fn is_passthrough(&self) -> bool {
        self.behavior == Behavior::Passthrough
    }
}

// === Hook Input/Output (external interface, §6) ===

/// Raw tool input as delivered by the host agent loop. Only the fields this
/// engine reads are modeled; everything else is opaque to us by design —
/// the JSON-RPC peer and stdio framing that produce this payload are out of
/// scope for this crate.
#[derive(Debug, Deserialize, Default)]
#[allow(dead_code)]
pub struct ToolInput {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub file_path: String,
}

#[derive(Debug, Deserialize, Default)]
#[allow(dead_code)]
pub struct HookInput {
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub permission_mode: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: ToolInputVariant,
}

#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
pub enum ToolInputVariant {
    Structured(ToolInput),
    Map(serde_json::Map<String, serde_json::Value>),
    #[default]
    Empty,
}

impl HookInput {
    pub fn get_command(&self) -> String {
        match &self.tool_input {
            ToolInputVariant::Structured(ti) => ti.command.clone(),
            ToolInputVariant::Map(m) => m
                .get("command")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            ToolInputVariant::Empty => String::new(),
        }
    }

    pub fn get_path(&self) -> String {
        match &self.tool_input {
            ToolInputVariant::Structured(ti) => {
                if !ti.file_path.is_empty() {
                    ti.file_path.clone()
                } else {
                    ti.path.clone()
                }
            }
            ToolInputVariant::Map(m) => m
                .get("file_path")
                .or_else(|| m.get("path"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            ToolInputVariant::Empty => String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub permission_decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<Update>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookOutput {
    pub fn from_decision(decision: &Decision) -> Self {
        let permission_decision = match decision.behavior {
            Behavior::Allow => "allow",
            Behavior::Deny => "deny",
            Behavior::Ask | Behavior::Passthrough => "ask",
        }
        .to_string();

        Self {
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: "PreToolUse".to_string(),
                permission_decision,
                permission_decision_reason: decision.message.clone(),
                suggestions: if decision.suggestions.is_empty() {
                    None
                } else {
                    Some(decision.suggestions.clone())
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_ordering() {
        assert!(Behavior::Deny > Behavior::Ask);
        assert!(Behavior::Ask > Behavior::Allow);
        assert!(Behavior::Allow > Behavior::Passthrough);
    }

    #[test]
    fn test_hook_output_allow() {
        let output = HookOutput::from_decision(&Decision::allow());
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"allow\""));
    }

    #[test]
    fn test_hook_output_deny_carries_reason() {
        let decision = Decision::deny("blocked", Reason::Other("test".into()));
        let output = HookOutput::from_decision(&decision);
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"deny\""));
        assert!(json.contains("blocked"));
    }

    #[test]
    fn test_get_command_from_map() {
        let mut map = serde_json::Map::new();
        map.insert("command".to_string(), serde_json::json!("ls -la"));
        let input = HookInput {
            tool_input: ToolInputVariant::Map(map),
            ..Default::default()
        };
        assert_eq!(input.get_command(), "ls -la");
    }
}
