//! Internal parsing state machine.

use crate::{
    lexer::{tokenize_with_trivia, Token, TokenKind},
    line_index::LineIndex,
    mapper::{document_range, Position, TextRange},
    parser::{ParseError, ParseErrorKind, ParsedDocument},
    symbol::*,
};
use slotmap::{SecondaryMap, SlotMap};

pub(super) struct Context<'src> {
    source: &'src str,
    tokens: Vec<Token<'src>>,
    symbols: SlotMap<SymbolId, SymbolData>,
    /// Byte spans per symbol, used to slice `text` once parsing is done.
    spans: SecondaryMap<SymbolId, (u32, u32)>,
    errors: Vec<ParseError>,
}

/// An open conditional block on the parse stack. `branch` is the branch
/// currently collecting expressions, if any.
struct OpenBlock {
    id: SymbolId,
    kind: BlockKind,
    branch: Option<SymbolId>,
}

impl<'src> Context<'src> {
    pub(super) fn new(source: &'src str, base_line: u32) -> Self {
        let mut tokens = tokenize_with_trivia(source);
        tokens.retain(|t| t.kind != TokenKind::Whitespace);

        if base_line > 0 {
            for token in &mut tokens {
                token.range.start.line += base_line;
                token.range.end.line += base_line;
            }
        }

        Self {
            source,
            tokens,
            symbols: SlotMap::with_key(),
            spans: SecondaryMap::new(),
            errors: Vec::new(),
        }
    }

    pub(super) fn run(mut self) -> ParsedDocument {
        let mut root_range = document_range(self.source);
        if let Some(first) = self.tokens.first() {
            root_range.start.line = root_range.start.line.max(1);
            root_range = root_range.cover(first.range);
        }

        let root = self.symbols.insert(SymbolData::new(
            String::new(),
            SymbolKind::CalculationRoot,
            root_range,
        ));
        self.spans.insert(root, (0, self.source.len() as u32));

        self.scan_type_hint(root);

        let eof = self.tokens.len() - 1;
        self.parse_range(0, eof, root);

        self.finalize(root);

        let mut doc = ParsedDocument {
            symbols: self.symbols,
            root,
            errors: self.errors,
            line_index: LineIndex::default(),
        };
        doc.rebuild_line_index();
        doc
    }

    /// A leading `/** @type {Boolean} */` doc comment declares the
    /// calculation's result type, using the same tag form the definition
    /// catalogue recognises.
    fn scan_type_hint(&mut self, root: SymbolId) {
        let Some(token) = self.tokens.first() else {
            return;
        };

        if token.kind != TokenKind::CommentBlock || !token.text.starts_with("/**") {
            return;
        }

        let Some(at) = token.text.find("@type") else {
            return;
        };

        let rest = token.text[at + "@type".len()..].trim_start();
        if let Some(inner) = rest.strip_prefix('{') {
            if let Some(end) = inner.find('}') {
                let hint = inner[..end].trim();
                if !hint.is_empty() {
                    self.symbols[root].jsdoc_type_hint = Some(hint.to_string());
                }
            }
        }
    }

    /// The main machine: parses tokens in `lo..hi` attaching symbols under
    /// `parent`, with a local stack of open conditional blocks.
    fn parse_range(&mut self, lo: usize, hi: usize, parent: SymbolId) {
        let mut stack: Vec<OpenBlock> = Vec::new();
        let mut i = lo;

        while i < hi {
            let token = self.tokens[i];

            match token.kind {
                TokenKind::If | TokenKind::Case => {
                    let attach = attach_point(&stack, parent);
                    let block_kind = if token.kind == TokenKind::If {
                        BlockKind::If
                    } else {
                        BlockKind::Case
                    };
                    let id = self.alloc(
                        attach,
                        block_kind.keyword().to_string(),
                        SymbolKind::ConditionalBlock(BlockSymbol {
                            block_kind,
                            incomplete: false,
                        }),
                        token,
                    );
                    stack.push(OpenBlock {
                        id,
                        kind: block_kind,
                        branch: None,
                    });
                    i += 1;
                }
                TokenKind::Then | TokenKind::Elseif | TokenKind::Else | TokenKind::When => {
                    i = self.handle_branch_keyword(&mut stack, parent, i);
                }
                TokenKind::End => {
                    if let Some(top) = stack.pop() {
                        let kw =
                            self.alloc(top.id, "END".to_string(), SymbolKind::Keyword, token);
                        self.symbols[top.id].end_keyword = Some(kw);
                    } else {
                        self.errors
                            .push(ParseError::new(token.range, ParseErrorKind::MismatchedEnd));
                        let attach = attach_point(&stack, parent);
                        self.alloc(attach, "END".to_string(), SymbolKind::Keyword, token);
                    }
                    i += 1;
                }
                TokenKind::Eof => break,
                _ => {
                    let attach = attach_point(&stack, parent);
                    i = self.parse_item(i, hi, attach);
                }
            }
        }

        // Blocks still open here never saw their END.
        while let Some(top) = stack.pop() {
            if let SymbolKind::ConditionalBlock(block) = &mut self.symbols[top.id].kind {
                block.incomplete = true;
            }
            let range = self.symbols[top.id].range;
            self.errors.push(ParseError::new(
                range,
                ParseErrorKind::UnclosedBlock {
                    keyword: top.kind.keyword(),
                },
            ));
        }
    }

    /// `THEN` inside a `CASE` block continues the current `WHEN` branch
    /// instead of opening a new one; everywhere else a branch keyword
    /// starts a fresh branch of the innermost block. Outside any block the
    /// keyword is kept as a plain keyword symbol for diagnostics.
    fn handle_branch_keyword(
        &mut self,
        stack: &mut Vec<OpenBlock>,
        parent: SymbolId,
        i: usize,
    ) -> usize {
        let token = self.tokens[i];

        if let Some(top) = stack.last_mut() {
            let continues_when = token.kind == TokenKind::Then
                && top.kind == BlockKind::Case
                && top.branch.map_or(false, |b| {
                    matches!(
                        self.symbols[b].kind,
                        SymbolKind::Branch(BranchSymbol {
                            branch_kind: BranchKind::When,
                        })
                    )
                });

            if continues_when {
                let branch = top.branch.expect("checked above");
                self.alloc(branch, "THEN".to_string(), SymbolKind::Keyword, token);
                return i + 1;
            }

            let branch_kind = match token.kind {
                TokenKind::Then => BranchKind::Then,
                TokenKind::Elseif => BranchKind::Elseif,
                TokenKind::Else => BranchKind::Else,
                _ => BranchKind::When,
            };

            let block = top.id;
            let branch = self.alloc(
                block,
                branch_kind.keyword().to_string(),
                SymbolKind::Branch(BranchSymbol { branch_kind }),
                token,
            );
            top.branch = Some(branch);
            return i + 1;
        }

        // Stray branch keyword; the diagnostics pass reports it.
        self.alloc(parent, token.upper_text(), SymbolKind::Keyword, token);
        i + 1
    }

    /// Parse one expression-level item starting at `i`, returning the index
    /// of the next unconsumed token.
    fn parse_item(&mut self, i: usize, hi: usize, parent: SymbolId) -> usize {
        let token = self.tokens[i];

        match token.kind {
            TokenKind::Identifier => {
                let j = self.next_significant(i + 1, hi);
                if j < hi && self.tokens[j].kind == TokenKind::ParenOpen {
                    self.parse_call(i, j, hi, parent)
                } else {
                    self.alloc(parent, token.upper_text(), SymbolKind::Expression, token);
                    i + 1
                }
            }
            TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::In => {
                // Logical keywords are never function calls, even before '('.
                self.alloc(parent, token.upper_text(), SymbolKind::Keyword, token);
                i + 1
            }
            TokenKind::FieldReference => {
                self.alloc(
                    parent,
                    token.field_name().to_string(),
                    SymbolKind::FieldReference,
                    token,
                );
                i + 1
            }
            TokenKind::Number => {
                let value = token.text.parse::<f64>().unwrap_or_default();
                self.alloc(
                    parent,
                    token.text.to_string(),
                    SymbolKind::Literal(LitSymbol {
                        value: LitValue::Number(value),
                    }),
                    token,
                );
                i + 1
            }
            TokenKind::String => {
                self.alloc(
                    parent,
                    token.text.to_string(),
                    SymbolKind::Literal(LitSymbol {
                        value: LitValue::String(token.string_value()),
                    }),
                    token,
                );
                i + 1
            }
            TokenKind::True | TokenKind::False => {
                self.alloc(
                    parent,
                    token.upper_text(),
                    SymbolKind::Literal(LitSymbol {
                        value: LitValue::Bool(token.kind == TokenKind::True),
                    }),
                    token,
                );
                i + 1
            }
            TokenKind::Null => {
                self.alloc(
                    parent,
                    token.upper_text(),
                    SymbolKind::Literal(LitSymbol {
                        value: LitValue::Null,
                    }),
                    token,
                );
                i + 1
            }
            TokenKind::BraceOpen => self.parse_brace(i, hi, parent),
            TokenKind::ParenOpen => self.parse_paren(i, hi, parent),
            TokenKind::CommentLine | TokenKind::CommentBlock => {
                self.alloc(parent, String::new(), SymbolKind::Comment, token);
                i + 1
            }
            TokenKind::Unexpected => {
                let kind = match token.text.as_bytes().first() {
                    Some(b'\'' | b'"') => ParseErrorKind::UnterminatedString,
                    Some(b'[') => ParseErrorKind::UnterminatedFieldReference,
                    _ => ParseErrorKind::UnexpectedToken,
                };
                self.errors.push(ParseError::new(token.range, kind));
                i + 1
            }
            // Operators and stray punctuation carry no symbols of their own.
            _ => i + 1,
        }
    }

    /// `ident (` — a function call. Arguments are split on top-level
    /// commas; if the closing parenthesis is missing the argument list
    /// stays empty and the call is marked unbalanced.
    fn parse_call(&mut self, ident_i: usize, paren_j: usize, hi: usize, parent: SymbolId) -> usize {
        let ident = self.tokens[ident_i];
        let call = self.alloc(
            parent,
            ident.upper_text(),
            SymbolKind::FunctionCall(CallSymbol { balanced: true }),
            ident,
        );
        self.extend(call, self.tokens[paren_j]);

        let mut depth = 1_i32;
        let mut k = paren_j + 1;
        let mut bounds = Vec::new();
        let mut arg_start = k;
        let mut close = None;

        while k < hi {
            match self.tokens[k].kind {
                TokenKind::ParenOpen | TokenKind::BraceOpen => depth += 1,
                TokenKind::BraceClose => depth -= 1,
                TokenKind::ParenClose => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(k);
                        break;
                    }
                }
                TokenKind::Comma if depth == 1 => {
                    bounds.push((arg_start, k));
                    arg_start = k + 1;
                }
                _ => {}
            }
            k += 1;
        }

        match close {
            Some(k) => {
                bounds.push((arg_start, k));
                if bounds.len() == 1 && bounds[0].0 == bounds[0].1 {
                    bounds.clear();
                }

                for (arg_lo, arg_hi) in bounds {
                    let argument = self.argument_of(arg_lo, arg_hi);
                    self.symbols[call].arguments.push(argument);
                    self.parse_range(arg_lo, arg_hi, call);
                }

                self.extend(call, self.tokens[k]);
                k + 1
            }
            None => {
                if let SymbolKind::FunctionCall(c) = &mut self.symbols[call].kind {
                    c.balanced = false;
                }
                paren_j + 1
            }
        }
    }

    /// `{` — either a LOD expression or a plain grouped expression.
    fn parse_brace(&mut self, i: usize, hi: usize, parent: SymbolId) -> usize {
        let open = self.tokens[i];
        let j = self.next_significant(i + 1, hi);

        if j >= hi || !self.tokens[j].kind.is_lod_type() {
            return self.parse_group(
                i,
                hi,
                parent,
                TokenKind::BraceOpen,
                TokenKind::BraceClose,
            );
        }

        let lod_type = match self.tokens[j].kind {
            TokenKind::Fixed => LodType::Fixed,
            TokenKind::Include => LodType::Include,
            _ => LodType::Exclude,
        };

        let lod = self.alloc(
            parent,
            lod_type.keyword().to_string(),
            SymbolKind::LodExpression(LodSymbol {
                lod_type,
                has_colon: false,
                has_aggregation: false,
                incomplete: false,
            }),
            open,
        );
        self.extend(lod, self.tokens[j]);

        let mut depth = 1_i32;
        let mut k = j + 1;
        let mut colon = None;
        let mut close = None;

        while k < hi {
            match self.tokens[k].kind {
                TokenKind::ParenOpen | TokenKind::BraceOpen => depth += 1,
                TokenKind::ParenClose => depth -= 1,
                TokenKind::BraceClose => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(k);
                        break;
                    }
                }
                TokenKind::Colon if depth == 1 && colon.is_none() => colon = Some(k),
                _ => {}
            }
            k += 1;
        }

        let body_end = close.unwrap_or(hi);
        let dims_end = colon.unwrap_or(body_end);

        // Dimension list: split on top-level commas, possibly empty.
        let mut dim_start = j + 1;
        let mut dim_depth = 0_i32;
        let mut d = j + 1;
        while d < dims_end {
            match self.tokens[d].kind {
                TokenKind::ParenOpen | TokenKind::BraceOpen => dim_depth += 1,
                TokenKind::ParenClose | TokenKind::BraceClose => dim_depth -= 1,
                TokenKind::Comma if dim_depth == 0 => {
                    self.parse_range(dim_start, d, lod);
                    dim_start = d + 1;
                }
                _ => {}
            }
            d += 1;
        }
        self.parse_range(dim_start, dims_end, lod);

        let mut has_aggregation = false;
        if let Some(c) = colon {
            has_aggregation = (c + 1..body_end)
                .any(|n| !self.tokens[n].kind.is_comment() && self.tokens[n].kind != TokenKind::Eof);
            self.parse_range(c + 1, body_end, lod);
        }

        if let SymbolKind::LodExpression(l) = &mut self.symbols[lod].kind {
            l.has_colon = colon.is_some();
            l.has_aggregation = has_aggregation;
            l.incomplete = close.is_none();
        }

        match close {
            Some(k) => {
                self.extend(lod, self.tokens[k]);
                k + 1
            }
            None => {
                if body_end > j + 1 {
                    self.extend(lod, self.tokens[body_end - 1]);
                }
                hi
            }
        }
    }

    fn parse_paren(&mut self, i: usize, hi: usize, parent: SymbolId) -> usize {
        self.parse_group(i, hi, parent, TokenKind::ParenOpen, TokenKind::ParenClose)
    }

    /// A delimited group becomes an `Expression` symbol with the inner
    /// items as children. An unmatched opener swallows the rest of the
    /// bound region (it is a pending multi-line span).
    fn parse_group(
        &mut self,
        i: usize,
        hi: usize,
        parent: SymbolId,
        open_kind: TokenKind,
        close_kind: TokenKind,
    ) -> usize {
        let open = self.tokens[i];
        let group = self.alloc(parent, String::new(), SymbolKind::Expression, open);

        let mut depth = 1_i32;
        let mut k = i + 1;
        let mut close = None;

        while k < hi {
            let kind = self.tokens[k].kind;
            if kind == open_kind {
                depth += 1;
            } else if kind == close_kind {
                depth -= 1;
                if depth == 0 {
                    close = Some(k);
                    break;
                }
            }
            k += 1;
        }

        let inner_end = close.unwrap_or(hi);
        self.parse_range(i + 1, inner_end, group);

        match close {
            Some(k) => {
                self.extend(group, self.tokens[k]);
                k + 1
            }
            None => {
                if inner_end > i + 1 {
                    self.extend(group, self.tokens[inner_end - 1]);
                }
                hi
            }
        }
    }

    fn argument_of(&self, lo: usize, hi: usize) -> Argument {
        if lo >= hi {
            let at = self.tokens[lo.min(self.tokens.len() - 1)].range.start;
            return Argument {
                text: String::new(),
                range: TextRange::new(at, at),
            };
        }

        let first = self.tokens[lo];
        let last = self.tokens[hi - 1];
        Argument {
            text: self.source[first.byte_start as usize..last.byte_end as usize].to_string(),
            range: TextRange::new(first.range.start, last.range.end),
        }
    }

    fn next_significant(&self, mut i: usize, hi: usize) -> usize {
        while i < hi && self.tokens[i].kind.is_comment() {
            i += 1;
        }
        i
    }

    fn alloc(
        &mut self,
        parent: SymbolId,
        name: String,
        kind: SymbolKind,
        token: Token<'src>,
    ) -> SymbolId {
        let mut data = SymbolData::new(name, kind, token.range);
        data.parent = Some(parent);
        let id = self.symbols.insert(data);
        self.spans.insert(id, (token.byte_start, token.byte_end));
        self.symbols[parent].children.push(id);
        id
    }

    fn extend(&mut self, id: SymbolId, token: Token<'src>) {
        let range = self.symbols[id].range.cover(token.range);
        self.symbols[id].range = range;
        if let Some(span) = self.spans.get_mut(id) {
            span.0 = span.0.min(token.byte_start);
            span.1 = span.1.max(token.byte_end);
        }
    }

    /// Post-order pass: parent ranges cover children, then raw text slices
    /// are materialized from the byte spans.
    fn finalize(&mut self, root: SymbolId) {
        self.cover_children(root);

        let ids: Vec<SymbolId> = self.symbols.keys().collect();
        for id in ids {
            if id == root {
                self.symbols[id].text = self.source.to_string();
                continue;
            }
            if let Some(&(lo, hi)) = self.spans.get(id) {
                self.symbols[id].text = self.source[lo as usize..hi as usize].to_string();
            }
        }
    }

    fn cover_children(&mut self, id: SymbolId) {
        let children = self.symbols[id].children.clone();
        for child in &children {
            self.cover_children(*child);
        }

        let mut range = self.symbols[id].range;
        let mut span = self.spans.get(id).copied().unwrap_or((0, 0));

        for child in children {
            range = range.cover(self.symbols[child].range);
            if let Some(&(lo, hi)) = self.spans.get(child) {
                span.0 = span.0.min(lo);
                span.1 = span.1.max(hi);
            }
        }

        self.symbols[id].range = range;
        self.spans.insert(id, span);
    }
}

fn attach_point(stack: &[OpenBlock], parent: SymbolId) -> SymbolId {
    stack
        .last()
        .map_or(parent, |top| top.branch.unwrap_or(top.id))
}
