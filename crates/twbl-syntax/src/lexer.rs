//! Logos-based lexer for TabCalc calculation source.
//!
//! Keywords are case-insensitive and are lexed as identifiers first, then
//! resolved against the keyword table by uppercase comparison. Offsets are
//! UTF-16 code units and lines/columns are 1-based.

use crate::mapper::{PositionTracker, TextRange};
use logos::{Lexer as LogosLexer, Logos};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(
    Logos, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TokenKind {
    // region: Punctuators
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    // endregion

    // region: Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("!")]
    Bang,
    // endregion

    // region: Literals
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[token("'", lex_single_quoted)]
    #[token("\"", lex_double_quoted)]
    String,

    #[token("[", lex_field_reference)]
    FieldReference,
    // endregion

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    // region: Trivia
    #[regex(r"//[^\n\r]*")]
    CommentLine,

    #[token("/*", lex_block_comment)]
    CommentBlock,

    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,
    // endregion

    #[error]
    Unexpected,

    /// Synthetic terminator, never produced by the scanner itself.
    Eof,

    // region: Keywords (resolved from identifiers, never lexed directly)
    If,
    Then,
    Else,
    Elseif,
    End,
    Case,
    When,
    And,
    Or,
    Not,
    In,
    Fixed,
    Include,
    Exclude,
    True,
    False,
    Null,
    // endregion
}

static KEYWORDS: Lazy<crate::HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    [
        ("IF", TokenKind::If),
        ("THEN", TokenKind::Then),
        ("ELSE", TokenKind::Else),
        ("ELSEIF", TokenKind::Elseif),
        ("END", TokenKind::End),
        ("CASE", TokenKind::Case),
        ("WHEN", TokenKind::When),
        ("AND", TokenKind::And),
        ("OR", TokenKind::Or),
        ("NOT", TokenKind::Not),
        ("IN", TokenKind::In),
        ("FIXED", TokenKind::Fixed),
        ("INCLUDE", TokenKind::Include),
        ("EXCLUDE", TokenKind::Exclude),
        ("TRUE", TokenKind::True),
        ("FALSE", TokenKind::False),
        ("NULL", TokenKind::Null),
    ]
    .into_iter()
    .collect()
});

impl TokenKind {
    #[must_use]
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::CommentLine | TokenKind::CommentBlock
        )
    }

    #[must_use]
    pub fn is_comment(self) -> bool {
        matches!(self, TokenKind::CommentLine | TokenKind::CommentBlock)
    }

    #[must_use]
    pub fn is_keyword(self) -> bool {
        self >= TokenKind::If && self <= TokenKind::Exclude
    }

    /// Keywords that open, continue or close a conditional block.
    #[must_use]
    pub fn is_block_structure(self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Then
                | TokenKind::Elseif
                | TokenKind::Else
                | TokenKind::End
                | TokenKind::Case
                | TokenKind::When
        )
    }

    /// Logical operator keywords, which never form function calls.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(
            self,
            TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::In
        )
    }

    #[must_use]
    pub fn is_lod_type(self) -> bool {
        matches!(
            self,
            TokenKind::Fixed | TokenKind::Include | TokenKind::Exclude
        )
    }

    #[must_use]
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::Number
                | TokenKind::String
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
        )
    }

    /// Binary operators that make a trailing line position a continuation.
    #[must_use]
    pub fn is_binary_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Eq
                | TokenKind::EqEq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::LtEq
                | TokenKind::Gt
                | TokenKind::GtEq
        )
    }

    #[must_use]
    pub fn is_operator(self) -> bool {
        self.is_binary_operator() || self == TokenKind::Bang
    }
}

/// A lexeme with its source slice and resolved position information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub text: &'s str,
    pub range: TextRange,
    /// Start offset in UTF-16 code units.
    pub start: u32,
    /// End offset in UTF-16 code units.
    pub end: u32,
    /// Byte offsets into the lexed source, for raw slicing.
    pub byte_start: u32,
    pub byte_end: u32,
}

impl<'s> Token<'s> {
    /// The inner name of a field reference token, without the delimiters.
    #[must_use]
    pub fn field_name(&self) -> &'s str {
        debug_assert_eq!(self.kind, TokenKind::FieldReference);
        self.text
            .strip_prefix('[')
            .map_or(self.text, |t| t.strip_suffix(']').unwrap_or(t))
    }

    /// The unescaped contents of a string token, without the quotes.
    #[must_use]
    pub fn string_value(&self) -> String {
        debug_assert_eq!(self.kind, TokenKind::String);
        let inner = self
            .text
            .strip_prefix(['\'', '"'])
            .map_or(self.text, |t| t.strip_suffix(['\'', '"']).unwrap_or(t));

        let mut out = String::with_capacity(inner.len());
        let mut escaped = false;
        for c in inner.chars() {
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else {
                out.push(c);
            }
        }
        out
    }

    /// The token's name normalized the way symbol names are stored.
    #[must_use]
    pub fn upper_text(&self) -> String {
        self.text.to_uppercase()
    }
}

/// Tokenize the full source, keeping comments and whitespace.
#[must_use]
pub fn tokenize_with_trivia(source: &str) -> Vec<Token<'_>> {
    let mut lexer: LogosLexer<TokenKind> = TokenKind::lexer(source);
    let mut tracker = PositionTracker::default();
    let mut tokens = Vec::new();

    while let Some(kind) = lexer.next() {
        let text = lexer.slice();
        let span = lexer.span();

        let kind = if kind == TokenKind::Identifier {
            KEYWORDS
                .get(text.to_uppercase().as_str())
                .copied()
                .unwrap_or(TokenKind::Identifier)
        } else {
            kind
        };

        let start = tracker.offset;
        let start_pos = tracker.position();
        tracker.advance(text);

        tokens.push(Token {
            kind,
            text,
            range: TextRange::new(start_pos, tracker.position()),
            start,
            end: tracker.offset,
            byte_start: span.start as u32,
            byte_end: span.end as u32,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: "",
        range: TextRange::new(tracker.position(), tracker.position()),
        start: tracker.offset,
        end: tracker.offset,
        byte_start: source.len() as u32,
        byte_end: source.len() as u32,
    });

    tokens
}

/// Tokenize the full source, skipping trivia. The result always ends in a
/// single `Eof` token.
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = tokenize_with_trivia(source);
    tokens.retain(|t| !t.kind.is_trivia());
    tokens
}

/// Net count of opened-but-unclosed parens and braces in the given tokens.
#[must_use]
pub fn delimiter_delta(tokens: &[Token]) -> i32 {
    tokens.iter().fold(0, |acc, t| match t.kind {
        TokenKind::ParenOpen | TokenKind::BraceOpen => acc + 1,
        TokenKind::ParenClose | TokenKind::BraceClose => acc - 1,
        _ => acc,
    })
}

/// Whether a line with these (trivia-free) tokens begins a multi-line span:
/// it leaves a delimiter open, or trails off in a binary operator or a
/// continuation keyword.
///
/// Brackets and quotes never surface as standalone delimiter tokens: an
/// unterminated field reference or string swallows the rest of the input
/// into one `Unexpected` token, so a trailing one of those means the
/// delimiter is still open and later lines belong to its span.
#[must_use]
pub fn begins_continuation(tokens: &[Token]) -> bool {
    if delimiter_delta(tokens) > 0 {
        return true;
    }

    tokens
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Eof)
        .map_or(false, |last| {
            last.kind.is_binary_operator()
                || matches!(last.kind, TokenKind::And | TokenKind::Or)
                || (last.kind == TokenKind::Unexpected
                    && last.text.starts_with(['[', '\'', '"']))
        })
}

fn lex_single_quoted(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    lex_quoted(lex, b'\'')
}

fn lex_double_quoted(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    lex_quoted(lex, b'"')
}

fn lex_quoted(lex: &mut LogosLexer<TokenKind>, quote: u8) -> Option<()> {
    let mut escaped = false;

    for (i, b) in lex.remainder().bytes().enumerate() {
        if !escaped && b == quote {
            lex.bump(i + 1);
            return Some(());
        }
        escaped = b == b'\\' && !escaped;
    }

    // Unterminated: consume to the end of input and surface as `Unexpected`.
    lex.bump(lex.remainder().len());
    None
}

fn lex_field_reference(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    for (i, b) in lex.remainder().bytes().enumerate() {
        if b == b']' {
            lex.bump(i + 1);
            return Some(());
        }
    }

    lex.bump(lex.remainder().len());
    None
}

// Block comments do not nest; an unterminated one runs to the end of input
// and still counts as trivia.
#[allow(clippy::unnecessary_wraps)]
fn lex_block_comment(lex: &mut LogosLexer<TokenKind>) -> Option<()> {
    let mut last = 0_u8;

    for (i, b) in lex.remainder().bytes().enumerate() {
        if last == b'*' && b == b'/' {
            lex.bump(i + 1);
            return Some(());
        }
        last = b;
    }

    lex.bump(lex.remainder().len());
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn tokens_cover_source_exactly() {
        let src = "IF [Sales] > 100 THEN 'High' /* x */ ELSE \"Low\" END // tail";
        let tokens = tokenize_with_trivia(src);
        let rebuilt: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, src);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = tokenize("if then elseIf END case when and or not in fixed");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::If,
                TokenKind::Then,
                TokenKind::Elseif,
                TokenKind::End,
                TokenKind::Case,
                TokenKind::When,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::In,
                TokenKind::Fixed,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn field_reference_keeps_inner_name() {
        let tokens = tokenize("[Sales Amount]");
        assert_eq!(tokens[0].kind, TokenKind::FieldReference);
        assert_eq!(tokens[0].field_name(), "Sales Amount");
    }

    #[test]
    fn unterminated_string_spans_to_eof() {
        let src = "SUM([Sales]) + 'oops";
        let tokens = tokenize(src);
        let unexpected = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Unexpected)
            .unwrap();
        assert_eq!(unexpected.text, "'oops");
        assert_eq!(unexpected.range.end.character as usize, src.len() + 1);
    }

    #[test]
    fn unterminated_field_reference_spans_to_eof() {
        let tokens = tokenize("[Sales + 1");
        assert_eq!(tokens[0].kind, TokenKind::Unexpected);
        assert_eq!(tokens[0].text, "[Sales + 1");
    }

    #[test]
    fn string_escapes() {
        let tokens = tokenize(r"'it\'s'");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].string_value(), "it's");
    }

    #[test_case("=", TokenKind::Eq)]
    #[test_case("==", TokenKind::EqEq)]
    #[test_case("!=", TokenKind::NotEq)]
    #[test_case("<=", TokenKind::LtEq)]
    #[test_case(">=", TokenKind::GtEq)]
    #[test_case("!", TokenKind::Bang)]
    fn operators_extend_to_two_chars(src: &str, kind: TokenKind) {
        let tokens = tokenize(src);
        assert_eq!(tokens[0].kind, kind);
        assert_eq!(tokens[0].text, src);
    }

    #[test]
    fn numbers_do_not_take_trailing_dot() {
        let tokens = tokenize("1.5 2.");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].text, "1.5");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "2");
        assert_eq!(tokens[2].kind, TokenKind::Unexpected);
    }

    #[test]
    fn comments_are_trivia() {
        let tokens = tokenize("// comment\n1 /* block */ + 2");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn positions_are_one_based_lines_and_columns() {
        let tokens = tokenize("1\n  22");
        assert_eq!(tokens[0].range.start, crate::Position::new(1, 1));
        assert_eq!(tokens[1].range.start, crate::Position::new(2, 3));
        assert_eq!(tokens[1].range.end, crate::Position::new(2, 5));
    }

    #[test]
    fn continuation_detection() {
        assert!(begins_continuation(&tokenize("[Sales] +")));
        assert!(begins_continuation(&tokenize("[Sales] > 1 AND")));
        assert!(begins_continuation(&tokenize("SUM([Sales]")));
        assert!(!begins_continuation(&tokenize("[Sales] > 1")));
        assert!(!begins_continuation(&tokenize("SUM([Sales])")));
    }

    #[test]
    fn unterminated_literals_are_continuations() {
        // The open bracket or quote is still unclosed at end of line.
        assert!(begins_continuation(&tokenize("[Sales")));
        assert!(begins_continuation(&tokenize("SUM([Sales]) + [Prof")));
        assert!(begins_continuation(&tokenize("'half a string")));
    }

    #[test]
    fn empty_input_is_just_eof() {
        let tokens = tokenize("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }
}
