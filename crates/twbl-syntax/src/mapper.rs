//! Line/column positions over UTF-16 code units, matching the position
//! encoding used by editors.

use serde::{Deserialize, Serialize};

/// A 1-based line/column pair. Columns count UTF-16 code units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open span between two positions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Inclusive variant used for cursor queries, where a cursor sitting
    /// right after the last character still belongs to the range.
    #[must_use]
    pub fn contains_inclusive(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    #[must_use]
    pub fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The smallest range covering both `self` and `other`.
    #[must_use]
    pub fn cover(&self, other: TextRange) -> TextRange {
        TextRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// The position just past the last character of `text`.
#[must_use]
pub fn end_position(text: &str) -> Position {
    let mut tracker = PositionTracker::default();
    tracker.advance(text);
    tracker.position()
}

/// The range covering the whole of `text`.
#[must_use]
pub fn document_range(text: &str) -> TextRange {
    TextRange::new(Position::new(1, 1), end_position(text))
}

/// Incremental position bookkeeping used by the lexer while walking the
/// source left to right.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PositionTracker {
    pub line: u32,
    pub character: u32,
    /// Running offset in UTF-16 code units.
    pub offset: u32,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self {
            line: 1,
            character: 1,
            offset: 0,
        }
    }
}

impl PositionTracker {
    pub(crate) fn position(&self) -> Position {
        Position::new(self.line, self.character)
    }

    pub(crate) fn advance(&mut self, text: &str) {
        for c in text.chars() {
            let units = c.len_utf16() as u32;
            self.offset += units;

            if c == '\n' {
                self.line += 1;
                self.character = 1;
            } else {
                self.character += units;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts_utf16_units() {
        let mut t = PositionTracker::default();
        t.advance("a𐐀b");
        // '𐐀' is two UTF-16 code units.
        assert_eq!(t.offset, 4);
        assert_eq!(t.character, 5);
        assert_eq!(t.line, 1);
    }

    #[test]
    fn tracker_handles_newlines() {
        let mut t = PositionTracker::default();
        t.advance("ab\ncd");
        assert_eq!(t.line, 2);
        assert_eq!(t.character, 3);
        assert_eq!(t.offset, 5);
    }

    #[test]
    fn range_containment() {
        let range = TextRange::new(Position::new(1, 3), Position::new(1, 7));
        assert!(range.contains(Position::new(1, 3)));
        assert!(range.contains(Position::new(1, 6)));
        assert!(!range.contains(Position::new(1, 7)));
        assert!(range.contains_inclusive(Position::new(1, 7)));
        assert!(!range.contains(Position::new(2, 1)));
    }
}
