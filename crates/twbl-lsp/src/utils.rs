//! Conversions between analysis positions and LSP positions, plus markdown
//! rendering for hover and completion documentation.

use lsp_types::TextDocumentContentChangeEvent;
use twbl_analysis::{FunctionSignature, Severity, TypeDef};
use twbl_syntax::{Position, TextRange};

/// Analysis positions are 1-based, LSP positions 0-based; both count UTF-16
/// code units.
#[must_use]
pub(crate) fn to_lsp_position(pos: Position) -> lsp_types::Position {
    lsp_types::Position {
        line: pos.line.saturating_sub(1),
        character: pos.character.saturating_sub(1),
    }
}

#[must_use]
pub(crate) fn from_lsp_position(pos: lsp_types::Position) -> Position {
    Position::new(pos.line + 1, pos.character + 1)
}

#[must_use]
pub(crate) fn to_lsp_range(range: TextRange) -> lsp_types::Range {
    lsp_types::Range {
        start: to_lsp_position(range.start),
        end: to_lsp_position(range.end),
    }
}

#[must_use]
pub(crate) fn to_lsp_severity(severity: Severity) -> lsp_types::DiagnosticSeverity {
    match severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Information => lsp_types::DiagnosticSeverity::INFORMATION,
        Severity::Hint => lsp_types::DiagnosticSeverity::HINT,
    }
}

pub(crate) trait TwblStringExt {
    fn wrap_twbl_markdown(&self) -> String;
}

impl<T: AsRef<str>> TwblStringExt for T {
    fn wrap_twbl_markdown(&self) -> String {
        format!("```twbl\n{}\n```", self.as_ref().trim_end())
    }
}

/// Markdown documentation for a catalogued function.
#[must_use]
pub(crate) fn documentation_for(signature: &FunctionSignature) -> String {
    let mut out = signature.label().wrap_twbl_markdown();

    if let Some(deprecated) = &signature.deprecated {
        out.push_str("\n\n*Deprecated*: ");
        out.push_str(deprecated);
    }

    if !signature.doc.is_empty() {
        out.push_str("\n\n");
        out.push_str(&signature.doc);
    }

    for param in &signature.parameters {
        if param.doc.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "\n- `{}` ({}): {}",
            param.name, param.ty, param.doc
        ));
    }

    if !signature.return_doc.is_empty() {
        out.push_str(&format!(
            "\n\n**Returns** `{}`: {}",
            signature.return_type, signature.return_doc
        ));
    }

    for example in &signature.examples {
        out.push_str("\n\n");
        out.push_str(&example.wrap_twbl_markdown());
    }

    if let Some(since) = &signature.since {
        out.push_str(&format!("\n\n*Since {since}*"));
    }

    out
}

/// Markdown documentation for a catalogued type or field entry.
#[must_use]
pub(crate) fn documentation_for_type(def: &TypeDef) -> String {
    let mut out = format!("{} ({})", def.name, def.ty).wrap_twbl_markdown();

    if !def.doc.is_empty() {
        out.push_str("\n\n");
        out.push_str(&def.doc);
    }

    for property in &def.properties {
        out.push_str(&format!(
            "\n- `{}` ({}): {}",
            property.name, property.ty, property.doc
        ));
    }

    out
}

/// Apply LSP content changes to a document. Range offsets arrive as UTF-16
/// code units and must be mapped onto byte offsets before splicing.
pub(crate) fn apply_document_changes(text: &mut String, changes: &[TextDocumentContentChangeEvent]) {
    for change in changes {
        match change.range {
            None => {
                *text = change.text.clone();
            }
            Some(range) => {
                let start = byte_offset(text, range.start);
                let end = byte_offset(text, range.end).max(start);
                text.replace_range(start..end, &change.text);
            }
        }
    }
}

fn byte_offset(text: &str, pos: lsp_types::Position) -> usize {
    let mut offset = 0_usize;

    for (index, line) in text.split_inclusive('\n').enumerate() {
        if index as u32 == pos.line {
            let mut units = 0_u32;
            for (byte_in_line, c) in line.char_indices() {
                if units >= pos.character {
                    return offset + byte_in_line;
                }
                units += c.len_utf16() as u32;
            }
            // Past the end of the line: clamp to its end, before the
            // terminating newline.
            let line_body = line.strip_suffix('\n').unwrap_or(line);
            let line_body = line_body.strip_suffix('\r').unwrap_or(line_body);
            return offset + line_body.len();
        }
        offset += line.len();
    }

    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(
        range: Option<((u32, u32), (u32, u32))>,
        text: &str,
    ) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: range.map(|((sl, sc), (el, ec))| lsp_types::Range {
                start: lsp_types::Position::new(sl, sc),
                end: lsp_types::Position::new(el, ec),
            }),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn full_change_replaces_text() {
        let mut text = "old".to_string();
        apply_document_changes(&mut text, &[change(None, "new")]);
        assert_eq!(text, "new");
    }

    #[test]
    fn ranged_change_splices() {
        let mut text = "SUM([Sales])".to_string();
        apply_document_changes(&mut text, &[change(Some(((0, 0), (0, 3))), "AVG")]);
        assert_eq!(text, "AVG([Sales])");
    }

    #[test]
    fn multi_line_change() {
        let mut text = "line one\nline two\nline three".to_string();
        apply_document_changes(&mut text, &[change(Some(((0, 5), (2, 5))), "X")]);
        assert_eq!(text, "line Xthree");
    }

    #[test]
    fn insertion_at_end() {
        let mut text = "SUM(".to_string();
        apply_document_changes(&mut text, &[change(Some(((0, 4), (0, 4))), "[Sales])")]);
        assert_eq!(text, "SUM([Sales])");
    }

    #[test]
    fn utf16_offsets_respect_surrogate_pairs() {
        // '𐐀' is one char but two UTF-16 units.
        let mut text = "𐐀abc".to_string();
        apply_document_changes(&mut text, &[change(Some(((0, 2), (0, 3))), "X")]);
        assert_eq!(text, "𐐀Xbc");
    }

    #[test]
    fn positions_round_trip() {
        let ours = Position::new(3, 7);
        assert_eq!(from_lsp_position(to_lsp_position(ours)), ours);
    }
}
