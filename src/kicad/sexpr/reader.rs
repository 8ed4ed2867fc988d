//! Tokeniser and parser for board document text.
//!
//! The parser is iterative so deeply nested input cannot exhaust the stack.

use super::{Content, Slot};
use crate::kicad::error::{DocumentError, DocumentResult};

pub(super) struct Parsed {
    pub slots: Vec<Slot>,
    pub root: u32,
    pub trailing: String,
}

const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

const fn is_delimiter(b: u8) -> bool {
    is_whitespace(b) || matches!(b, b'(' | b')' | b'"')
}

pub(super) fn parse(text: &str) -> DocumentResult<Parsed> {
    let bytes = text.as_bytes();
    let mut slots: Vec<Slot> = Vec::new();
    let mut open: Vec<(u32, usize)> = Vec::new();
    let mut root: Option<u32> = None;
    let mut pos = 0;

    loop {
        let ws_start = pos;
        while pos < bytes.len() && is_whitespace(bytes[pos]) {
            pos += 1;
        }
        let leading = text[ws_start..pos].to_string();

        let Some(&byte) = bytes.get(pos) else {
            if let Some(&(_, offset)) = open.last() {
                return Err(DocumentError::syntax(offset, "unclosed '('"));
            }
            return match root {
                Some(root) => Ok(Parsed {
                    slots,
                    root,
                    trailing: leading,
                }),
                None => Err(DocumentError::syntax(pos, "empty document")),
            };
        };

        if byte == b')' {
            let Some((index, _)) = open.pop() else {
                return Err(DocumentError::syntax(pos, "unexpected ')'"));
            };
            if let Content::List { close, .. } = &mut slots[index as usize].content {
                *close = leading;
            }
            pos += 1;
            continue;
        }

        let parent = open.last().map(|&(index, _)| index);
        if parent.is_none() {
            if root.is_some() {
                return Err(DocumentError::syntax(
                    pos,
                    "unexpected content after the root expression",
                ));
            }
            if byte != b'(' {
                return Err(DocumentError::syntax(pos, "expected '('"));
            }
        }

        let start = pos;
        let content = match byte {
            b'(' => {
                pos += 1;
                Content::List {
                    children: Vec::new(),
                    close: String::new(),
                }
            }
            b'"' => {
                let (end, value) = read_string(text, pos)?;
                pos = end;
                Content::Str {
                    raw: text[start..end].to_string(),
                    value,
                }
            }
            _ => {
                while pos < bytes.len() && !is_delimiter(bytes[pos]) {
                    pos += 1;
                }
                classify(&text[start..pos], start)?
            }
        };

        let index = u32::try_from(slots.len())
            .map_err(|_| DocumentError::syntax(start, "document has too many nodes"))?;
        let is_list = matches!(content, Content::List { .. });
        slots.push(Slot::new(content, leading, parent));
        match parent {
            Some(parent) => {
                if let Content::List { children, .. } = &mut slots[parent as usize].content {
                    children.push(index);
                }
            }
            None => root = Some(index),
        }
        if is_list {
            open.push((index, start));
        }
    }
}

/// Reads a quoted string starting at the opening quote.
///
/// Returns the offset just past the closing quote and the unescaped value.
fn read_string(text: &str, start: usize) -> DocumentResult<(usize, String)> {
    let mut value = String::new();
    let mut chars = text[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((start + 1 + i + 1, value)),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err(DocumentError::syntax(start, "unterminated string"))
}

/// Returns `true` if `token` is spelled as a decimal number:
/// `[+-]digits[.digits][(e|E)[+-]digits]`, with digits required on at least
/// one side of the decimal point.
fn is_numeric(token: &str) -> bool {
    let bytes = token.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digits += i - frac_start;
    }
    if digits == 0 {
        return false;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

fn classify(token: &str, offset: usize) -> DocumentResult<Content> {
    if !is_numeric(token) {
        return Ok(Content::Symbol(token.to_string()));
    }
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Content::Number {
            raw: token.to_string(),
            value,
        }),
        _ => Err(DocumentError::syntax(
            offset,
            format!("invalid numeric literal '{token}'"),
        )),
    }
}
