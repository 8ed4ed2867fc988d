//! Serialisation of documents back to text.

use super::{Content, Document};

enum Step {
    Open(u32),
    Close(u32),
}

pub(super) fn write_document(doc: &Document) -> String {
    let mut out = String::with_capacity(doc.slots.len() * 8);
    write_nodes(doc, doc.root, true, &mut out);
    out.push_str(&doc.trailing);
    out
}

pub(super) fn write_subtree(doc: &Document, index: u32) -> String {
    let mut out = String::new();
    write_nodes(doc, index, false, &mut out);
    out
}

fn write_nodes(doc: &Document, start: u32, with_leading: bool, out: &mut String) {
    let mut steps = vec![Step::Open(start)];
    while let Some(step) = steps.pop() {
        match step {
            Step::Open(index) => {
                let slot = &doc.slots[index as usize];
                if with_leading || index != start {
                    out.push_str(&slot.leading);
                }
                match &slot.content {
                    Content::List { children, .. } => {
                        out.push('(');
                        steps.push(Step::Close(index));
                        steps.extend(children.iter().rev().map(|&c| Step::Open(c)));
                    }
                    Content::Symbol(text) => out.push_str(text),
                    Content::Str { raw, .. } | Content::Number { raw, .. } => out.push_str(raw),
                }
            }
            Step::Close(index) => {
                if let Content::List { close, .. } = &doc.slots[index as usize].content {
                    out.push_str(close);
                }
                out.push(')');
            }
        }
    }
}

/// Formats a number the way board files spell coordinates: at most six
/// decimals, no trailing zeros, and never `-0`.
#[must_use]
pub fn format_number(value: f64) -> String {
    let mut text = format!("{value:.6}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// Quotes and escapes a string value.
#[must_use]
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-1.5), "-1.5");
        assert_eq!(format_number(1.234_567_89), "1.234568");
        assert_eq!(format_number(-0.000_000_1), "0");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn string_quoting() {
        assert_eq!(quote_string("GND"), "\"GND\"");
        assert_eq!(quote_string("a \"b\"\n"), "\"a \\\"b\\\"\\n\"");
    }

    #[test]
    fn subtree_excludes_leading_whitespace() {
        let doc = Document::parse("(a\n\t(b 1 \"x\"))").unwrap();
        let b = doc.root().child("b").unwrap();
        assert_eq!(b.to_text(), "(b 1 \"x\")");
    }

    #[test]
    fn deep_documents_serialize() {
        let depth = 20_000;
        let text = format!("{}{}", "(a ".repeat(depth), ")".repeat(depth));
        let doc = Document::parse(&text).unwrap();
        assert_eq!(doc.serialize(), text);
    }
}
