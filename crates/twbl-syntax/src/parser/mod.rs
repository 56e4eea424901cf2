//! Block-structured parser for TabCalc calculations.
//!
//! Parsing never fails: malformed input becomes best-effort symbols plus
//! recorded [`ParseError`]s, and the returned tree is always structurally
//! valid.

use crate::{
    line_index::LineIndex,
    mapper::{end_position, Position, TextRange},
    symbol::{SymbolData, SymbolId, SymbolKind},
};
use slotmap::SlotMap;
use thiserror::Error;

mod context;

/// A parser over a full document or a line region of one.
pub struct Parser<'src> {
    source: &'src str,
    base_line: u32,
}

impl<'src> Parser<'src> {
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            base_line: 0,
        }
    }

    /// Parse a region of a larger document. All resulting lines are offset
    /// by `base_line`, so line 1 of the region becomes `base_line + 1`.
    #[must_use]
    pub fn with_base_line(mut self, base_line: u32) -> Self {
        self.base_line = base_line;
        self
    }

    #[must_use]
    pub fn parse(self) -> ParsedDocument {
        context::Context::new(self.source, self.base_line).run()
    }
}

/// The symbol tree of one document version, together with the lexical and
/// structural errors encountered while building it.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub(crate) symbols: SlotMap<SymbolId, SymbolData>,
    pub(crate) root: SymbolId,
    pub errors: Vec<ParseError>,
    pub line_index: LineIndex,
}

impl ParsedDocument {
    #[must_use]
    pub fn root(&self) -> SymbolId {
        self.root
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> Option<&SymbolData> {
        self.symbols.get(id)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &SymbolData)> {
        self.symbols.iter()
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// The ordered top-level symbols (children of the calculation root).
    #[must_use]
    pub fn top_level(&self) -> &[SymbolId] {
        &self.symbols[self.root].children
    }

    /// The innermost symbol whose range contains the position.
    #[must_use]
    pub fn symbol_at(&self, pos: Position) -> Option<SymbolId> {
        self.line_index
            .symbols_on(pos.line)
            .iter()
            .copied()
            .filter(|&id| id != self.root)
            .filter(|&id| self.symbols[id].range.contains_inclusive(pos))
            .max_by_key(|&id| {
                let r = self.symbols[id].range;
                // Innermost: latest start, then tightest end.
                (r.start, std::cmp::Reverse(r.end))
            })
    }

    /// The deepest conditional block whose range contains the position.
    #[must_use]
    pub fn enclosing_block_at(&self, pos: Position) -> Option<SymbolId> {
        let mut current = self.symbol_at(pos)?;
        loop {
            if self.symbols[current].is_block() {
                return Some(current);
            }
            current = self.symbols[current].parent?;
        }
    }

    pub fn rebuild_line_index(&mut self) {
        self.line_index = LineIndex::build(&self.symbols);
    }

    /// Remove every top-level symbol starting within the given line range,
    /// dropping its whole subtree. Returns the index at which replacement
    /// symbols should be inserted.
    pub fn remove_top_level_in_lines(&mut self, first: u32, last: u32) -> usize {
        let removed: Vec<SymbolId> = self.symbols[self.root]
            .children
            .iter()
            .copied()
            .filter(|&id| {
                let line = self.symbols[id].range.start.line;
                (first..=last).contains(&line)
            })
            .collect();

        let insert_at = self.symbols[self.root]
            .children
            .iter()
            .position(|&id| self.symbols[id].range.start.line >= first)
            .unwrap_or(self.symbols[self.root].children.len());

        for id in removed {
            let pos = self.symbols[self.root]
                .children
                .iter()
                .position(|&c| c == id)
                .expect("top-level symbol must be a root child");
            self.symbols[self.root].children.remove(pos);
            self.drop_subtree(id);
        }

        insert_at
    }

    /// Clone the donor's top-level symbols into this document's arena and
    /// insert them at `index` among the root children.
    pub fn insert_top_level_from(&mut self, donor: &ParsedDocument, index: usize) {
        let mut grafted = Vec::new();
        for &child in donor.top_level() {
            grafted.push(self.clone_subtree(donor, child, Some(self.root)));
        }

        let root = self.root;
        let index = index.min(self.symbols[root].children.len());
        for (offset, id) in grafted.into_iter().enumerate() {
            self.symbols[root].children.insert(index + offset, id);
        }
    }

    /// Shift every symbol starting after `line` by `delta` lines. Used when
    /// a splice changes the document's line count.
    pub fn shift_lines_after(&mut self, line: u32, delta: i32) {
        if delta == 0 {
            return;
        }

        let root = self.root;
        let shift = |l: u32| -> u32 { (i64::from(l) + i64::from(delta)).max(1) as u32 };

        let ids: Vec<SymbolId> = self.symbols.keys().collect();
        for id in ids {
            if id == root || self.symbols[id].range.start.line <= line {
                continue;
            }
            let data = &mut self.symbols[id];
            data.range.start.line = shift(data.range.start.line);
            data.range.end.line = shift(data.range.end.line);
            for arg in &mut data.arguments {
                arg.range.start.line = shift(arg.range.start.line);
                arg.range.end.line = shift(arg.range.end.line);
            }
        }
    }

    /// Refresh the root symbol after a splice so it covers the new text.
    pub fn set_root_text(&mut self, text: &str) {
        let root = self.root;
        self.symbols[root].range = TextRange::new(Position::new(1, 1), end_position(text));
        self.symbols[root].text = text.to_string();
    }

    /// Check the structural invariants of the tree. Violations indicate a
    /// bad splice and the caller is expected to fall back to a full parse.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        for (id, data) in self.symbols.iter() {
            match &data.kind {
                SymbolKind::ConditionalBlock(block) => {
                    if !block.incomplete && data.end_keyword.is_none() {
                        return Err(InvariantViolation::BlockWithoutEnd(data.range));
                    }
                }
                SymbolKind::Branch(_) => {
                    let parent_is_block = data
                        .parent
                        .and_then(|p| self.symbols.get(p))
                        .map_or(false, SymbolData::is_block);
                    if !parent_is_block {
                        return Err(InvariantViolation::StrayBranch(data.range));
                    }
                }
                _ => {}
            }

            if id != self.root && data.range.is_empty() && !data.text.is_empty() {
                return Err(InvariantViolation::EmptyRange(data.range));
            }

            let mut prev_end: Option<Position> = None;
            for &child in &data.children {
                let child_range = self.symbols[child].range;
                if id != self.root && !data.range.contains_range(child_range) {
                    return Err(InvariantViolation::ChildEscapesParent(child_range));
                }
                if let Some(prev) = prev_end {
                    if child_range.start < prev {
                        return Err(InvariantViolation::UnorderedSiblings(child_range));
                    }
                }
                prev_end = Some(child_range.end);
            }
        }

        Ok(())
    }

    /// Indented textual dump of the tree, for troubleshooting.
    #[must_use]
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        self.write_node(&mut out, self.root, 0);
        out
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.node_json(self.root)
    }

    fn write_node(&self, out: &mut String, id: SymbolId, depth: usize) {
        use std::fmt::Write;

        let data = &self.symbols[id];
        let _ = writeln!(
            out,
            "{:indent$}{}{}{} @ {}:{}..{}:{}",
            "",
            data.kind.tag(),
            if data.name.is_empty() { "" } else { " " },
            data.name,
            data.range.start.line,
            data.range.start.character,
            data.range.end.line,
            data.range.end.character,
            indent = depth * 2
        );

        for &child in &data.children {
            self.write_node(out, child, depth + 1);
        }
    }

    fn node_json(&self, id: SymbolId) -> serde_json::Value {
        let data = &self.symbols[id];
        serde_json::json!({
            "kind": data.kind.tag(),
            "name": data.name,
            "range": data.range,
            "arguments": data.arguments,
            "incomplete": data.kind.as_conditional_block().map(|b| b.incomplete),
            "typeHint": data.jsdoc_type_hint,
            "children": data
                .children
                .iter()
                .map(|&c| self.node_json(c))
                .collect::<Vec<_>>(),
        })
    }

    fn drop_subtree(&mut self, id: SymbolId) {
        let children = self.symbols[id].children.clone();
        for child in children {
            self.drop_subtree(child);
        }
        self.symbols.remove(id);
    }

    fn clone_subtree(
        &mut self,
        donor: &ParsedDocument,
        id: SymbolId,
        parent: Option<SymbolId>,
    ) -> SymbolId {
        let mut data = donor.symbols[id].clone();
        data.parent = parent;
        data.children = Vec::new();
        data.end_keyword = None;

        let new_id = self.symbols.insert(data);

        let donor_children = donor.symbols[id].children.clone();
        let donor_end = donor.symbols[id].end_keyword;

        for child in donor_children {
            let new_child = self.clone_subtree(donor, child, Some(new_id));
            self.symbols[new_id].children.push(new_child);
            if donor_end == Some(child) {
                self.symbols[new_id].end_keyword = Some(new_child);
            }
        }

        new_id
    }
}

impl std::ops::Index<SymbolId> for ParsedDocument {
    type Output = SymbolData;

    fn index(&self, id: SymbolId) -> &Self::Output {
        &self.symbols[id]
    }
}

/// A non-fatal parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub range: TextRange,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(range: TextRange, kind: ParseErrorKind) -> Self {
        Self { range, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated field reference")]
    UnterminatedFieldReference,

    #[error("unexpected token")]
    UnexpectedToken,

    #[error("END without a matching IF or CASE")]
    MismatchedEnd,

    #[error("{keyword} block is missing its END")]
    UnclosedBlock { keyword: &'static str },
}

/// A broken structural invariant detected after a splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("block at {0:?} has neither an END nor an incomplete marker")]
    BlockWithoutEnd(TextRange),

    #[error("branch at {0:?} is not a child of a conditional block")]
    StrayBranch(TextRange),

    #[error("empty range at {0:?}")]
    EmptyRange(TextRange),

    #[error("sibling ranges out of order at {0:?}")]
    UnorderedSiblings(TextRange),

    #[error("child range escapes its parent at {0:?}")]
    ChildEscapesParent(TextRange),
}
