//! The token-stream formatter.
//!
//! Keywords come out uppercase, binary operators get single-space padding,
//! block keywords start their own lines (with `THEN` staying inline inside
//! `CASE` arms), and argument lists expand one-per-line when they are
//! complex. Indent levels opened by expanded argument lists live on a
//! stack and are popped on the matching close parenthesis.

use crate::Options;
use twbl_syntax::{
    lexer::{tokenize_with_trivia, Token, TokenKind},
    symbol::BlockKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParenCtx {
    Inline,
    Expanded,
}

pub struct Formatter<'s> {
    tokens: Vec<Token<'s>>,
    options: Options,
    out: String,
    indent: usize,
    at_line_start: bool,
    suppress_space: bool,
    prev_kind: Option<TokenKind>,
    prev_end_line: u32,
    blocks: Vec<BlockKind>,
    parens: Vec<ParenCtx>,
    brace_depth: usize,
}

impl<'s> Formatter<'s> {
    #[must_use]
    pub fn new(source: &'s str, options: Options) -> Self {
        let mut tokens = tokenize_with_trivia(source);
        tokens.retain(|t| t.kind != TokenKind::Whitespace && t.kind != TokenKind::Eof);

        Self {
            tokens,
            options,
            out: String::new(),
            indent: 0,
            at_line_start: true,
            suppress_space: false,
            prev_kind: None,
            prev_end_line: 1,
            blocks: Vec::new(),
            parens: Vec::new(),
            brace_depth: 0,
        }
    }

    #[must_use]
    pub fn format(mut self) -> String {
        for i in 0..self.tokens.len() {
            let token = self.tokens[i];

            self.preserve_top_level_breaks(&token);

            match token.kind {
                TokenKind::If => {
                    self.break_line();
                    self.blocks.push(BlockKind::If);
                    self.word("IF");
                    self.indent += 1;
                }
                TokenKind::Case => {
                    self.break_line();
                    self.blocks.push(BlockKind::Case);
                    self.word("CASE");
                    self.indent += 1;
                }
                TokenKind::When | TokenKind::Elseif | TokenKind::Else => {
                    self.break_line();
                    let level = self.indent.saturating_sub(1);
                    self.word_at(keyword_text(token.kind), level);
                }
                TokenKind::Then => {
                    // CASE arms read `WHEN value THEN result` on one line.
                    if self.blocks.last() == Some(&BlockKind::Case) {
                        self.word("THEN");
                    } else {
                        self.break_line();
                        let level = self.indent.saturating_sub(1);
                        self.word_at("THEN", level);
                    }
                }
                TokenKind::End => {
                    self.indent = self.indent.saturating_sub(1);
                    self.break_line();
                    self.word("END");
                    self.blocks.pop();
                }
                TokenKind::ParenOpen => {
                    let is_call = self.prev_kind == Some(TokenKind::Identifier);
                    let expanded = is_call && self.complex_arguments(i);

                    // Attached to the callee, spaced everywhere else.
                    self.push_str("(", !is_call);
                    self.parens.push(if expanded {
                        ParenCtx::Expanded
                    } else {
                        ParenCtx::Inline
                    });

                    if expanded {
                        self.indent += 1;
                        self.newline();
                    }
                }
                TokenKind::ParenClose => {
                    let ctx = self.parens.pop().unwrap_or(ParenCtx::Inline);
                    if ctx == ParenCtx::Expanded {
                        self.indent = self.indent.saturating_sub(1);
                        self.newline();
                    }
                    self.push_str(")", false);
                }
                TokenKind::Comma => {
                    self.push_str(",", false);
                    if self.parens.last() == Some(&ParenCtx::Expanded) {
                        self.newline();
                    }
                }
                TokenKind::BraceOpen => {
                    self.brace_depth += 1;
                    self.word("{");
                }
                TokenKind::BraceClose => {
                    self.brace_depth = self.brace_depth.saturating_sub(1);
                    self.word("}");
                }
                TokenKind::Minus if self.minus_is_unary() => {
                    self.word("-");
                    self.suppress_space = true;
                }
                TokenKind::CommentLine => {
                    self.word(token.text.trim_end());
                    self.prev_kind = Some(token.kind);
                    self.prev_end_line = token.range.end.line;
                    // A line comment owns the rest of its line.
                    self.newline();
                    continue;
                }
                kind if kind.is_keyword() || matches!(kind, TokenKind::True | TokenKind::False | TokenKind::Null) => {
                    self.word(keyword_text(kind));
                }
                _ => {
                    self.word(token.text);
                }
            }

            self.prev_kind = Some(token.kind);
            self.prev_end_line = token.range.end.line;
        }

        while !self.out.is_empty() && self.out.ends_with([' ', '\n']) {
            self.out.pop();
        }

        if self.options.trailing_newline && !self.out.is_empty() {
            self.out.push('\n');
        }

        self.out
    }

    /// Outside any delimiter, user line breaks (and a single blank line)
    /// survive formatting.
    fn preserve_top_level_breaks(&mut self, token: &Token) {
        if !self.parens.is_empty() || self.brace_depth > 0 || self.at_line_start {
            return;
        }

        if token.range.start.line > self.prev_end_line {
            let blank = token.range.start.line - self.prev_end_line > 1;
            self.newline();
            if blank {
                self.out.push('\n');
            }
        }
    }

    fn complex_arguments(&self, open: usize) -> bool {
        let mut depth = 1_i32;
        let mut commas = 0_usize;
        let mut nested_call = false;
        let mut prev_ident = false;
        let mut closed = false;

        for token in &self.tokens[open + 1..] {
            match token.kind {
                TokenKind::ParenOpen => {
                    if prev_ident {
                        nested_call = true;
                    }
                    depth += 1;
                }
                TokenKind::BraceOpen => depth += 1,
                TokenKind::BraceClose => depth -= 1,
                TokenKind::ParenClose => {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                }
                TokenKind::Comma if depth == 1 => commas += 1,
                _ => {}
            }
            prev_ident = token.kind == TokenKind::Identifier;
        }

        closed && (commas + 1 > self.options.max_inline_arguments || nested_call)
    }

    fn minus_is_unary(&self) -> bool {
        match self.prev_kind {
            None => true,
            Some(kind) => !matches!(
                kind,
                TokenKind::Identifier
                    | TokenKind::Number
                    | TokenKind::String
                    | TokenKind::FieldReference
                    | TokenKind::ParenClose
                    | TokenKind::BraceClose
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Null
            ),
        }
    }

    fn word(&mut self, text: &str) {
        self.push_str(text, true);
    }

    /// Write a word at an explicit indent level when starting a line;
    /// branch keywords sit one level shallower than their branch bodies.
    fn word_at(&mut self, text: &str, indent: usize) {
        if self.at_line_start {
            for _ in 0..indent {
                self.out.push_str(&self.options.indent_string);
            }
            self.at_line_start = false;
            self.suppress_space = false;
            self.out.push_str(text);
        } else {
            self.word(text);
        }
    }

    fn push_str(&mut self, text: &str, spaced: bool) {
        if self.at_line_start {
            for _ in 0..self.indent {
                self.out.push_str(&self.options.indent_string);
            }
            self.at_line_start = false;
        } else if spaced && !self.suppress_space && self.needs_space() {
            self.out.push(' ');
        }

        self.suppress_space = false;
        self.out.push_str(text);
    }

    fn needs_space(&self) -> bool {
        !matches!(self.prev_kind, Some(TokenKind::ParenOpen))
    }

    fn break_line(&mut self) {
        if !self.at_line_start {
            self.newline();
        }
    }

    fn newline(&mut self) {
        while self.out.ends_with(' ') {
            self.out.pop();
        }
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.at_line_start = true;
    }
}

fn keyword_text(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::If => "IF",
        TokenKind::Then => "THEN",
        TokenKind::Else => "ELSE",
        TokenKind::Elseif => "ELSEIF",
        TokenKind::End => "END",
        TokenKind::Case => "CASE",
        TokenKind::When => "WHEN",
        TokenKind::And => "AND",
        TokenKind::Or => "OR",
        TokenKind::Not => "NOT",
        TokenKind::In => "IN",
        TokenKind::Fixed => "FIXED",
        TokenKind::Include => "INCLUDE",
        TokenKind::Exclude => "EXCLUDE",
        TokenKind::True => "TRUE",
        TokenKind::False => "FALSE",
        TokenKind::Null => "NULL",
        _ => "",
    }
}
