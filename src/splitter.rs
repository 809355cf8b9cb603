//! Subcommand splitting and redirection extraction over a tokenized
//! command.

use crate::tokenizer::{detokenize, Token};

const SAFE_SEPARATORS: &[&str] = &["&&", "||", ";", "|", ";;"];

/// Splits a token stream at safe separators (`&&`, `||`, `;`, `|`, `;;`,
/// newline), ignoring separators inside `(...)`/`<(...)` depth. Returns the
/// re-emitted text of each subcommand.
pub fn split(tokens: &[Token]) -> Vec<String> {
    let mut subcommands = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0i32;

    for token in tokens {
        match token {
            Token::Op(op) if op == "(" || op == "<(" || op == ">(" => {
                depth += 1;
                current.push(token.clone());
            }
            Token::Op(op) if op == ")" => {
                depth -= 1;
                current.push(token.clone());
            }
            Token::Op(op) if depth == 0 && SAFE_SEPARATORS.contains(&op.as_str()) => {
                flush(&mut current, &mut subcommands);
            }
            Token::Newline if depth == 0 => {
                flush(&mut current, &mut subcommands);
            }
            other => current.push(other.clone()),
        }
    }
    flush(&mut current, &mut subcommands);
    subcommands
}

fn flush(current: &mut Vec<Token>, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(detokenize(current));
        current.clear();
    }
}

/// A command is safe-composed iff every top-level operator separating
/// subcommands is one of the safe separators or a redirection operator.
/// Anything else (bare `(`/`)` at depth 0 outside a substitution, a
/// dangling operator) makes it an "unsafe compound" that must be screened
/// as a whole.
pub fn is_safe_composed(tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    for token in tokens {
        if let Token::Op(op) = token {
            match op.as_str() {
                "(" | "<(" | ">(" => depth += 1,
                ")" => depth -= 1,
                _ if depth > 0 => {}
                "&&" | "||" | ";" | "|" | ";;" | "<<<" => {}
                op if is_redirection_op(op) => {}
                _ => return false,
            }
        }
    }
    true
}

fn is_redirection_op(op: &str) -> bool {
    if matches!(op, ">" | ">>" | "<" | ">&") {
        return true;
    }
    // FD-qualified: digits followed by >, >>, or >&digits
    let mut chars = op.chars().peekable();
    let mut saw_digit = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            saw_digit = true;
            chars.next();
        } else {
            break;
        }
    }
    saw_digit && matches!(chars.next(), Some('>'))
}

#[derive(Debug, Clone)]
pub struct Redirection {
    pub operator: String,
    pub target: String,
}

/// Strips output redirections from a command, returning the command text
/// with redirection tokens removed and the list of `{operator, target}`
/// pairs. Only pulls redirections whose target is a simple path: no `$`,
/// backtick, glob character, pure digits (an FD duplication like `2>&1`),
/// or empty target.
pub fn extract_redirections(tokens: &[Token]) -> (String, Vec<Redirection>) {
    let mut kept: Vec<Token> = Vec::new();
    let mut redirections = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Op(op) if is_output_redirection(op) => {
                if let Some(Token::Word { text, .. }) = tokens.get(i + 1) {
                    if is_simple_redirect_target(text) {
                        redirections.push(Redirection {
                            operator: op.clone(),
                            target: text.clone(),
                        });
                        i += 2;
                        continue;
                    }
                }
                kept.push(tokens[i].clone());
            }
            other => kept.push(other.clone()),
        }
        i += 1;
    }

    (detokenize(&kept), redirections)
}

fn is_output_redirection(op: &str) -> bool {
    if matches!(op, ">" | ">>") {
        return true;
    }
    let trailing = op.trim_start_matches(|c: char| c.is_ascii_digit());
    trailing == ">" || trailing == ">>"
}

fn is_simple_redirect_target(target: &str) -> bool {
    if target.is_empty() {
        return false;
    }
    if target.chars().all(|c| c.is_ascii_digit()) {
        return false; // FD duplication, e.g. `2>&1`'s `1`
    }
    !target.contains(['$', '`', '*', '?', '['])
}
