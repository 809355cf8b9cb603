//! Tool permission engine hook entry point.
//!
//! Reads a single JSON tool-use payload from stdin, runs it through the
//! permission pipeline, and writes a JSON decision to stdout, matching the
//! `PreToolUse` hook contract:
//!
//!   `echo '{"tool_name":"Bash","tool_input":{"command":"ls"}}' | permission-engine`

use std::io::{self, Read as _};
use std::path::PathBuf;

use permission_engine::context::{load_permission_context, LoadOptions};
use permission_engine::models::{HookInput, HookOutput, Operation};
use permission_engine::orchestrator::{
    check_bash_permissions, check_file_permissions, suggest_for_command, BashCheckInput,
    CheckResult, FileCheckInput,
};

fn main() {
    let mut raw = String::new();
    if io::stdin().read_to_string(&mut raw).is_err() {
        print_allow();
        return;
    }

    let input: HookInput = match serde_json::from_str(&raw) {
        Ok(input) => input,
        Err(_) => {
            print_allow();
            return;
        }
    };

    let project_dir = if input.cwd.is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        PathBuf::from(&input.cwd)
    };
    let home_dir = dirs::home_dir().unwrap_or_else(|| project_dir.clone());

    let mut ctx = load_permission_context(LoadOptions {
        project_dir: project_dir.clone(),
        home_dir,
        include_project_overrides: true,
        bypass_available: false,
    });
    ctx.original_cwd = project_dir.clone();

    let result = match input.tool_name.as_str() {
        "Bash" => {
            let command = input.get_command();
            let mut result = check_bash_permissions(BashCheckInput {
                command: &command,
                context: &ctx,
                cwd: &project_dir,
            });
            if let CheckResult::Blocked { suggestions, .. } = &mut result {
                if suggestions.is_empty() {
                    *suggestions = suggest_for_command(&command);
                }
            }
            result
        }
        "Read" => check_file_permissions(FileCheckInput {
            path: &input.get_path(),
            operation: Operation::Read,
            context: &ctx,
        }),
        "Edit" | "MultiEdit" => check_file_permissions(FileCheckInput {
            path: &input.get_path(),
            operation: Operation::Edit,
            context: &ctx,
        }),
        "Write" => check_file_permissions(FileCheckInput {
            path: &input.get_path(),
            operation: Operation::Create,
            context: &ctx,
        }),
        _ => CheckResult::Allowed,
    };

    print_result(result);
}

fn print_result(result: CheckResult) {
    let decision = match result {
        CheckResult::Allowed => permission_engine::models::Decision::allow(),
        CheckResult::Blocked {
            message,
            should_prompt_user,
            suggestions,
        } => {
            if should_prompt_user {
                permission_engine::models::Decision::ask_with_suggestions(message, suggestions)
            } else {
                permission_engine::models::Decision::deny(
                    message,
                    permission_engine::models::Reason::Other(String::new()),
                )
            }
        }
    };
    let output = HookOutput::from_decision(&decision);
    println!("{}", serde_json::to_string(&output).unwrap_or_default());
}

fn print_allow() {
    let output = HookOutput::from_decision(&permission_engine::models::Decision::allow());
    println!("{}", serde_json::to_string(&output).unwrap_or_default());
}
