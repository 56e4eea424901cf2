//! The diagnostics pass: walks the symbol tree (and re-lexes the raw text
//! for lexical issues) and produces the full diagnostic set for one
//! document version. Cheap relative to parsing, so it always runs from
//! scratch.

use crate::catalog::Catalog;
use twbl_syntax::{
    lexer,
    mapper::document_range,
    symbol::{SymbolData, SymbolKind},
    ParseErrorKind, ParsedDocument, Position, SymbolId, TextRange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: TextRange,
    pub severity: Severity,
    pub message: String,
    pub code: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSettings {
    pub max_nesting_depth: usize,
    pub max_complexity: usize,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            max_nesting_depth: 5,
            max_complexity: 25,
        }
    }
}

/// Compute all diagnostics for a document version.
#[must_use]
pub fn compute(
    text: &str,
    parsed: &ParsedDocument,
    catalog: &Catalog,
    settings: &DiagnosticsSettings,
) -> Vec<Diagnostic> {
    if text.trim().is_empty() {
        return vec![Diagnostic {
            range: document_range(text),
            severity: Severity::Information,
            message: "Empty calculation".to_string(),
            code: "empty-calculation",
        }];
    }

    let mut out = Vec::new();

    for error in &parsed.errors {
        out.push(Diagnostic {
            range: error.range,
            severity: Severity::Error,
            message: match &error.kind {
                ParseErrorKind::UnclosedBlock { keyword } => {
                    format!("{keyword} block is missing its END")
                }
                other => other.to_string(),
            },
            code: match &error.kind {
                ParseErrorKind::UnterminatedString => "unterminated-string",
                ParseErrorKind::UnterminatedFieldReference => "unterminated-field",
                ParseErrorKind::UnexpectedToken => "unexpected-token",
                ParseErrorKind::MismatchedEnd => "mismatched-end",
                ParseErrorKind::UnclosedBlock { .. } => "unclosed-block",
            },
        });
    }

    let mut walker = Walker {
        parsed,
        catalog,
        settings,
        out: &mut out,
        nesting_reported: false,
        structural_count: 0,
    };
    walker.visit(parsed.root(), 0, false);

    let structural_count = walker.structural_count;
    if structural_count > settings.max_complexity {
        out.push(Diagnostic {
            range: parsed[parsed.root()].range,
            severity: Severity::Information,
            message: format!(
                "Calculation has {structural_count} blocks and calls; consider splitting it into \
                 smaller calculated fields"
            ),
            code: "complexity",
        });
    }

    partial_expression(text, &mut out);

    out.sort_by_key(|d| (d.range.start, d.range.end));
    out
}

struct Walker<'a> {
    parsed: &'a ParsedDocument,
    catalog: &'a Catalog,
    settings: &'a DiagnosticsSettings,
    out: &'a mut Vec<Diagnostic>,
    nesting_reported: bool,
    structural_count: usize,
}

impl Walker<'_> {
    fn visit(&mut self, id: SymbolId, depth: usize, in_flagged_aggregation: bool) {
        let parsed = self.parsed;
        let data = &parsed[id];

        let nested = matches!(
            data.kind,
            SymbolKind::ConditionalBlock(_)
                | SymbolKind::FunctionCall(_)
                | SymbolKind::LodExpression(_)
        );
        let depth = if nested { depth + 1 } else { depth };
        if nested {
            self.structural_count += 1;
        }

        if nested && depth > self.settings.max_nesting_depth && !self.nesting_reported {
            self.nesting_reported = true;
            self.out.push(Diagnostic {
                range: data.range,
                severity: Severity::Information,
                message: format!(
                    "Nesting deeper than {} levels; consider splitting the calculation",
                    self.settings.max_nesting_depth
                ),
                code: "nesting-depth",
            });
        }

        let mut flagged_here = false;

        match &data.kind {
            SymbolKind::Keyword => self.check_stray_branch(data),
            SymbolKind::LodExpression(lod) => {
                if lod.incomplete {
                    self.push_error(data.range, "LOD expression is missing its closing '}'");
                } else if !lod.has_colon {
                    self.push_error(data.range, "LOD expression is missing ':'");
                } else if !lod.has_aggregation {
                    self.push_error(
                        data.range,
                        "LOD expression is missing an aggregation after ':'",
                    );
                }
            }
            SymbolKind::FunctionCall(call) => {
                self.check_call(data, call.balanced);

                if !in_flagged_aggregation && self.catalog.is_aggregation(&data.name) {
                    if let Some(inner) = self.find_nested_aggregation(id) {
                        let inner_name = self.parsed[inner].name.clone();
                        self.out.push(Diagnostic {
                            range: data.range,
                            severity: Severity::Information,
                            message: format!(
                                "Nested aggregation: {inner_name} inside {}; consider using a \
                                 LOD expression instead",
                                data.name
                            ),
                            code: "nested-aggregation",
                        });
                        flagged_here = true;
                    }
                }
            }
            SymbolKind::Expression => self.check_bare_identifier(data),
            _ => {}
        }

        for &child in &data.children {
            self.visit(child, depth, in_flagged_aggregation || flagged_here);
        }
    }

    /// Branch keywords that never found an enclosing block are kept in the
    /// tree as plain keyword symbols; report them here.
    fn check_stray_branch(&mut self, data: &SymbolData) {
        if !matches!(data.name.as_str(), "THEN" | "ELSEIF" | "ELSE" | "WHEN") {
            return;
        }

        let mut current = data.parent;
        while let Some(p) = current {
            if self.parsed[p].is_block() {
                return;
            }
            current = self.parsed[p].parent;
        }

        self.out.push(Diagnostic {
            range: data.range,
            severity: Severity::Error,
            message: format!("{} is not inside an IF or CASE block", data.name),
            code: "stray-branch",
        });
    }

    fn check_call(&mut self, data: &SymbolData, balanced: bool) {
        let Some(signature) = self.catalog.function(&data.name) else {
            self.check_unknown_name(data);
            return;
        };

        if !balanced {
            return;
        }

        let count = data.arguments.len();
        let multi_line = data.range.end.line > data.range.start.line;

        // A multi-line call with nothing between the parentheses is most
        // likely still being typed; stay quiet until it settles.
        if count == 0 && multi_line {
            return;
        }

        let too_few = count < signature.min_args;
        let too_many = signature.max_args.map_or(false, |max| count > max);

        if too_few || too_many {
            self.out.push(Diagnostic {
                range: data.range,
                severity: Severity::Warning,
                message: format!(
                    "{} expects {} argument{}, got {count}",
                    data.name,
                    signature.arity_label(),
                    if signature.max_args == Some(1) && signature.min_args == 1 {
                        ""
                    } else {
                        "s"
                    },
                ),
                code: "arity",
            });
        }
    }

    fn check_unknown_name(&mut self, data: &SymbolData) {
        let written = data
            .text
            .split('(')
            .next()
            .unwrap_or(&data.text)
            .trim()
            .to_string();

        if !looks_like_function(&written) {
            return;
        }

        let suggestion = self
            .catalog
            .nearest_function(&data.name)
            .map(|n| format!("; did you mean {n}?"))
            .unwrap_or_default();

        self.out.push(Diagnostic {
            range: data.range,
            severity: Severity::Information,
            message: format!("Unknown function {}{suggestion}", data.name),
            code: "unknown-function",
        });
    }

    /// Bare identifiers that read like function names but match nothing in
    /// the catalogue.
    fn check_bare_identifier(&mut self, data: &SymbolData) {
        if data.name.is_empty() || !data.children.is_empty() {
            return;
        }

        if !looks_like_function(data.text.trim()) || self.catalog.function(&data.name).is_some() {
            return;
        }

        self.out.push(Diagnostic {
            range: data.range,
            severity: Severity::Information,
            message: format!("Unknown function {}", data.name),
            code: "unknown-function",
        });
    }

    /// An aggregation call nested below `id` without a LOD expression in
    /// between.
    fn find_nested_aggregation(&self, id: SymbolId) -> Option<SymbolId> {
        let mut pending: Vec<SymbolId> = self.parsed[id].children.to_vec();

        while let Some(current) = pending.pop() {
            let data = &self.parsed[current];
            match &data.kind {
                SymbolKind::LodExpression(_) => continue,
                SymbolKind::FunctionCall(_) if self.catalog.is_aggregation(&data.name) => {
                    return Some(current);
                }
                _ => pending.extend(data.children.iter().copied()),
            }
        }

        None
    }

    fn push_error(&mut self, range: TextRange, message: &str) {
        self.out.push(Diagnostic {
            range,
            severity: Severity::Error,
            message: message.to_string(),
            code: "lod-shape",
        });
    }
}

/// A calculation whose final line trails off in an operator or continuation
/// keyword is incomplete; earlier such lines are continued by the lines
/// that follow them and stay quiet.
fn partial_expression(text: &str, out: &mut Vec<Diagnostic>) {
    let last_line = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .last();

    let Some((index, line)) = last_line else {
        return;
    };

    let tokens = lexer::tokenize(line);
    let trailing = tokens
        .iter()
        .rev()
        .find(|t| t.kind != lexer::TokenKind::Eof);

    let Some(last) = trailing else { return };

    if last.kind.is_binary_operator()
        || matches!(last.kind, lexer::TokenKind::And | lexer::TokenKind::Or)
    {
        let line_no = index as u32 + 1;
        let range = TextRange::new(
            Position::new(line_no, last.range.start.character),
            Position::new(line_no, last.range.end.character),
        );
        out.push(Diagnostic {
            range,
            severity: Severity::Information,
            message: "Expression appears incomplete".to_string(),
            code: "incomplete-expression",
        });
    }
}

fn looks_like_function(written: &str) -> bool {
    !written.is_empty()
        && written.chars().any(|c| c.is_ascii_alphabetic())
        && (written.contains('_') || !written.chars().any(|c| c.is_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use twbl_syntax::Parser;

    fn diagnostics(src: &str) -> Vec<Diagnostic> {
        let parsed = Parser::new(src).parse();
        compute(
            src,
            &parsed,
            &Catalog::builtin(),
            &DiagnosticsSettings::default(),
        )
    }

    #[test]
    fn clean_block_has_no_diagnostics() {
        let out = diagnostics(r#"IF [Sales] > 100 THEN "High" ELSE "Low" END"#);
        assert!(out.is_empty(), "unexpected: {out:?}");
    }

    #[test]
    fn nested_aggregation_is_advisory() {
        let out = diagnostics("SUM(AVG([Sales]))");
        assert_eq!(out.len(), 1, "expected exactly one: {out:?}");
        assert_eq!(out[0].severity, Severity::Information);
        assert!(out[0].message.contains("Nested aggregation"));
        assert!(out[0].message.contains("LOD"));
    }

    #[test]
    fn lod_separates_aggregations() {
        let out = diagnostics("SUM({ FIXED [Customer] : AVG([Sales]) })");
        assert!(
            out.iter().all(|d| d.code != "nested-aggregation"),
            "unexpected: {out:?}"
        );
    }

    #[test]
    fn unclosed_block_mentions_end() {
        let out = diagnostics(r#"IF [Sales] > 100 THEN "High" ELSE "Low""#);
        let d = out.iter().find(|d| d.code == "unclosed-block").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("END"));
    }

    #[test]
    fn empty_calculation() {
        let out = diagnostics("   \n  ");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Information);
        assert_eq!(out[0].message, "Empty calculation");
    }

    #[test]
    fn wrong_arity_is_a_warning() {
        let out = diagnostics("DATEDIFF('day')");
        let d = out.iter().find(|d| d.code == "arity").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert!(d.message.contains("DATEDIFF"));
    }

    #[test]
    fn multiline_empty_call_is_suppressed() {
        let out = diagnostics("DATEDIFF(\n)");
        assert!(out.iter().all(|d| d.code != "arity"), "unexpected: {out:?}");
    }

    #[test]
    fn unknown_function_with_suggestion() {
        let out = diagnostics("SUMM([Sales])");
        let d = out.iter().find(|d| d.code == "unknown-function").unwrap();
        assert_eq!(d.severity, Severity::Information);
        assert!(d.message.contains("SUM"));
    }

    #[test]
    fn lowercase_unknown_names_stay_quiet() {
        let out = diagnostics("whatever([Sales])");
        assert!(out.iter().all(|d| d.code != "unknown-function"));
    }

    #[test]
    fn stray_branch_keyword() {
        let out = diagnostics("THEN 1");
        let d = out.iter().find(|d| d.code == "stray-branch").unwrap();
        assert_eq!(d.severity, Severity::Error);
    }

    #[test]
    fn lod_missing_colon() {
        let out = diagnostics("{ FIXED [Customer] SUM([Sales]) }");
        assert!(out.iter().any(|d| d.code == "lod-shape"));
    }

    #[test]
    fn trailing_operator_is_partial() {
        let out = diagnostics("[Sales] +");
        let d = out
            .iter()
            .find(|d| d.code == "incomplete-expression")
            .unwrap();
        assert_eq!(d.severity, Severity::Information);
    }

    #[test]
    fn continued_lines_are_not_partial() {
        let out = diagnostics("[Sales] +\n[Profit]");
        assert!(out.iter().all(|d| d.code != "incomplete-expression"));
    }

    #[test]
    fn deep_nesting_reports_once() {
        let src = "ZN(ZN(ZN(ZN(ZN(ZN(ZN([x])))))))";
        let out = diagnostics(src);
        let hits: Vec<_> = out.iter().filter(|d| d.code == "nesting-depth").collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::Information);
    }

    #[test]
    fn case_block_is_clean() {
        let out = diagnostics(r#"CASE [R] WHEN "N" THEN 1 WHEN "S" THEN 2 ELSE 0 END"#);
        assert!(out.is_empty(), "unexpected: {out:?}");
    }
}
