//! A reversible, quote-aware shell tokenizer. Does not implement a full
//! POSIX shell grammar — it produces a flat token stream good enough for
//! splitting, redirection extraction, and per-utility argv extraction, and
//! it can re-emit a canonical command string from that stream.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeError {
    UnbalancedQuote(usize),
    UnbalancedParen(usize),
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizeError::UnbalancedQuote(at) => write!(f, "unbalanced quote at byte {at}"),
            TokenizeError::UnbalancedParen(at) => write!(f, "unbalanced parenthesis at byte {at}"),
        }
    }
}

impl std::error::Error for TokenizeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quote {
    None,
    Single,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word, possibly assembled from multiple quoted/unquoted runs
    /// (`foo"bar"baz` is one word). `quote` records the predominant
    /// quoting style used, for canonical re-emission.
    Word { text: String, quote: Quote },
    /// An operator: `&&`, `||`, `;`, `;;`, `|`, `>`, `>>`, `<`, `<<<`,
    /// `<(`, `>(`, `(`, `)`, `>&`, or an FD-qualified redirection like
    /// `2>` / `2>>` / `2>&1` (stored verbatim in `op`).
    Op(String),
    /// A newline, kept distinct from `;` so callers can choose whether to
    /// treat it as a separator.
    Newline,
}

/// Tokenizes `cmd` into a flat stream. When `preserve_newlines` is false,
/// newlines are folded into plain whitespace (not emitted as tokens).
pub fn tokenize(cmd: &str, preserve_newlines: bool) -> Result<Vec<Token>, TokenizeError> {
    let bytes: Vec<char> = cmd.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    let mut paren_depth: i32 = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c == '\n' {
            if preserve_newlines {
                tokens.push(Token::Newline);
            }
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Multi-char operators, longest match first.
        if let Some((op, len)) = match_operator(&bytes, i) {
            if op == "(" {
                paren_depth += 1;
            } else if op == ")" {
                paren_depth -= 1;
                if paren_depth < 0 {
                    return Err(TokenizeError::UnbalancedParen(i));
                }
            }
            tokens.push(Token::Op(op));
            i += len;
            continue;
        }

        // A word: consume runs of quoted/unquoted characters until
        // whitespace or an operator boundary.
        let start = i;
        let mut text = String::new();
        let mut quote = Quote::None;
        while i < bytes.len() {
            let c = bytes[i];
            if c.is_whitespace() {
                break;
            }
            if c == '\'' {
                quote = Quote::Single;
                i += 1;
                let close = find_close(&bytes, i, '\'');
                match close {
                    Some(end) => {
                        text.extend(&bytes[i..end]);
                        i = end + 1;
                    }
                    None => return Err(TokenizeError::UnbalancedQuote(start)),
                }
                continue;
            }
            if c == '"' {
                if quote == Quote::None {
                    quote = Quote::Double;
                }
                i += 1;
                let close = find_close_double(&bytes, i);
                match close {
                    Some(end) => {
                        text.extend(&bytes[i..end]);
                        i = end + 1;
                    }
                    None => return Err(TokenizeError::UnbalancedQuote(start)),
                }
                continue;
            }
            if c == '\\' && i + 1 < bytes.len() {
                text.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if match_operator(&bytes, i).is_some() {
                break;
            }
            text.push(c);
            i += 1;
        }
        if text.is_empty() && i == start {
            // Stray character we don't understand as an operator or word
            // start (shouldn't normally happen); consume it literally to
            // guarantee forward progress.
            text.push(c);
            i += 1;
        }
        tokens.push(Token::Word { text, quote });
    }

    if paren_depth != 0 {
        return Err(TokenizeError::UnbalancedParen(bytes.len()));
    }

    Ok(tokens)
}

fn find_close(chars: &[char], from: usize, quote: char) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j] == quote)
}

fn find_close_double(chars: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '\\' && j + 1 < chars.len() {
            j += 2;
            continue;
        }
        if chars[j] == '"' {
            return Some(j);
        }
        j += 1;
    }
    None
}

const OPERATORS: &[&str] = &[
    "<<<", ">>", "&&", "||", ";;", "<(", ">(", ">&", "<", ">", "|", ";", "(", ")",
];

fn match_operator(chars: &[char], at: usize) -> Option<(String, usize)> {
    // FD-qualified redirections: `N>`, `N>>`, `N>&M`.
    if chars[at].is_ascii_digit() {
        let mut j = at;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
        if j < chars.len() && chars[j] == '>' {
            let mut end = j + 1;
            if end < chars.len() && chars[end] == '>' {
                end += 1;
            } else if end < chars.len() && chars[end] == '&' {
                end += 1;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
            }
            let op: String = chars[at..end].iter().collect();
            return Some((op, end - at));
        }
    }

    for op in OPERATORS {
        let op_chars: Vec<char> = op.chars().collect();
        if at + op_chars.len() <= chars.len() && chars[at..at + op_chars.len()] == op_chars[..] {
            return Some((op.to_string(), op_chars.len()));
        }
    }
    None
}

/// Re-emits a canonical command string from a token stream. Requoting is
/// applied to bare words containing shell-significant characters.
pub fn detokenize(tokens: &[Token]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Word { text, quote } => parts.push(render_word(text, quote)),
            Token::Op(op) => parts.push(op.clone()),
            Token::Newline => parts.push("\n".to_string()),
        }
    }
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && part != "\n" && parts[i - 1] != "\n" {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

fn render_word(text: &str, quote: &Quote) -> String {
    match quote {
        Quote::Single => format!("'{text}'"),
        Quote::Double => format!("\"{text}\""),
        Quote::None => {
            if needs_requoting(text) {
                format!("'{}'", text.replace('\'', "'\\''"))
            } else {
                text.to_string()
            }
        }
    }
}

fn needs_requoting(text: &str) -> bool {
    text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '|' | ';' | '&'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert_eq;

    #[test]
    fn tokenizes_simple_command() {
        let tokens = tokenize("ls -la /tmp", false).unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(matches!(&tokens[0], Token::Word { text, .. } if text == "ls"));
    }

    #[test]
    fn tokenizes_operators() {
        let tokens = tokenize("echo a && echo b", false).unwrap();
        assert!(tokens
            .iter()
            .any(|t| matches!(t, Token::Op(op) if op == "&&")));
    }

    #[test]
    fn tokenizes_redirection_with_fd() {
        let tokens = tokenize("cmd 2>&1", false).unwrap();
        assert!(tokens
            .iter()
            .any(|t| matches!(t, Token::Op(op) if op == "2>&1")));
    }

    #[test]
    fn unbalanced_quote_errors() {
        assert!(tokenize("echo 'unterminated", false).is_err());
    }

    #[test]
    fn unbalanced_paren_errors() {
        assert!(tokenize("echo $(foo", false).is_err());
    }

    #[test]
    fn roundtrip_simple_commands() {
        for cmd in ["ls -la /tmp", "echo hi && echo bye", "cat a.txt | grep foo"] {
            let tokens = tokenize(cmd, false).unwrap();
            assert_eq!(detokenize(&tokens), cmd);
        }
    }

    #[test]
    fn roundtrip_preserves_quoted_content() {
        let cmd = "git commit -m 'fix bug'";
        let tokens = tokenize(cmd, false).unwrap();
        assert_eq!(detokenize(&tokens), cmd);
    }

    proptest::proptest! {
        #[test]
        fn tokenize_never_panics(s in ".{0,80}") {
            let _ = tokenize(&s, false);
        }

        #[test]
        fn tokenize_roundtrips_or_errors(s in "[a-zA-Z0-9 ._/-]{0,60}") {
            if let Ok(tokens) = tokenize(&s, false) {
                let rendered = detokenize(&tokens);
                let normalize = |t: &str| t.split_whitespace().collect::<Vec<_>>().join(" ");
                prop_assert_eq!(normalize(&rendered), normalize(&s));
            }
        }
    }
}
