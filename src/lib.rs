//! Tool permission engine for an LLM-driven coding agent.
//!
//! Decides allow/deny/ask for two kinds of tool invocations before they
//! run: shell command execution (`Bash`) and filesystem access
//! (`Read`/`Edit`/`Write`). Intended to sit behind a `PreToolUse` hook:
//! the host agent loop sends a JSON tool-use payload on stdin and reads a
//! JSON permission decision back on stdout (see [`main`](../src/main.rs)).
//!
//! # Example
//!
//! ```
//! use permission_engine::context::{load_permission_context, LoadOptions};
//! use permission_engine::orchestrator::{check_bash_permissions, BashCheckInput, CheckResult};
//! use std::path::PathBuf;
//!
//! let ctx = load_permission_context(LoadOptions {
//!     project_dir: PathBuf::from("/tmp"),
//!     home_dir: PathBuf::from("/tmp"),
//!     include_project_overrides: false,
//!     bypass_available: false,
//! });
//!
//! match check_bash_permissions(BashCheckInput {
//!     command: "ls /tmp",
//!     context: &ctx,
//!     cwd: &ctx.original_cwd,
//! }) {
//!     CheckResult::Allowed => {}
//!     CheckResult::Blocked { .. } => panic!("expected allow"),
//! }
//! ```

pub mod context;
pub mod evaluator;
pub mod extractors;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod patterns;
pub mod path_resolver;
pub mod screeners;
pub mod settings;
pub mod settings_writer;
pub mod splitter;
pub mod tokenizer;

pub use context::{apply_updates, load_permission_context, persist_update, LoadOptions, ToolPermissionContext};
pub use models::{CommandInfo, Decision, HookInput, HookOutput, Mode, Operation, Scope, Update};
pub use orchestrator::{
    check_bash_permissions, check_file_permissions, suggest_for_command, BashCheckInput,
    CheckResult, FileCheckInput,
};
