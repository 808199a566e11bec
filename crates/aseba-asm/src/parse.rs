//! Line-level grammar: blank/comment, a lone label, or `[label:] opcode [args]`.

use crate::error::AssembleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Blank,
    /// A label with no instruction on its line.
    Label(String),
    Instruction {
        label: Option<String>,
        mnemonic: String,
        args: Vec<String>,
    },
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Strip a trailing `; comment` (no quoting/escaping in this grammar).
fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

pub fn parse_line(raw: &str, line_no: usize) -> Result<ParsedLine, AssembleError> {
    let code = strip_comment(raw).trim();
    if code.is_empty() {
        return Ok(ParsedLine::Blank);
    }

    // A lone label: the whole line is just "name:".
    if let Some(name) = code.strip_suffix(':') {
        if is_ident(name) {
            return Ok(ParsedLine::Label(name.to_string()));
        }
    }

    let mut rest = code;
    let mut label = None;
    if let Some(colon) = rest.find(':') {
        let candidate = rest[..colon].trim();
        if is_ident(candidate) {
            label = Some(candidate.to_string());
            rest = rest[colon + 1..].trim_start();
        }
    }

    let (mnemonic, arg_str) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim()),
        None => (rest, ""),
    };

    if !is_ident(mnemonic) {
        return Err(AssembleError::SyntaxError { line: line_no });
    }

    let args = if arg_str.is_empty() {
        Vec::new()
    } else {
        arg_str
            .split(',')
            .map(|a| a.trim().to_string())
            .collect()
    };

    Ok(ParsedLine::Instruction {
        label,
        mnemonic: mnemonic.to_string(),
        args,
    })
}
