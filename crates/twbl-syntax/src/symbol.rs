//! The symbol tree produced by the parser.
//!
//! All symbols live in an arena owned by the parsed document; `parent`,
//! `children` and `end_keyword` are handles into it, never owning
//! references, so lookups stay cheap and lifetimes trivially bounded.

use crate::mapper::TextRange;
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

slotmap::new_key_type! { pub struct SymbolId; }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolData {
    /// Uppercased where applicable (keywords, function names); field
    /// reference names are kept verbatim.
    pub name: String,
    pub kind: SymbolKind,
    pub range: TextRange,
    /// Raw source slice covered by the symbol.
    pub text: String,
    /// Call arguments, in order. Empty when the parentheses are unbalanced.
    pub arguments: Vec<Argument>,
    pub children: Vec<SymbolId>,
    pub parent: Option<SymbolId>,
    /// For conditional blocks, the `END` keyword symbol that closes them.
    pub end_keyword: Option<SymbolId>,
    /// Declared result type from a leading `/** @type {...} */` comment.
    pub jsdoc_type_hint: Option<String>,
}

impl SymbolData {
    pub(crate) fn new(name: String, kind: SymbolKind, range: TextRange) -> Self {
        Self {
            name,
            kind,
            range,
            text: String::new(),
            arguments: Vec::new(),
            children: Vec::new(),
            parent: None,
            end_keyword: None,
            jsdoc_type_hint: None,
        }
    }

    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self.kind, SymbolKind::ConditionalBlock(_))
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, SymbolKind::Branch(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub text: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, EnumAsInner)]
pub enum SymbolKind {
    CalculationRoot,
    Keyword,
    ConditionalBlock(BlockSymbol),
    Branch(BranchSymbol),
    FunctionCall(CallSymbol),
    FieldReference,
    LodExpression(LodSymbol),
    Expression,
    Literal(LitSymbol),
    Comment,
}

impl SymbolKind {
    /// Stable lowercase tag used in tree dumps and JSON views.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            SymbolKind::CalculationRoot => "calculation",
            SymbolKind::Keyword => "keyword",
            SymbolKind::ConditionalBlock(_) => "block",
            SymbolKind::Branch(_) => "branch",
            SymbolKind::FunctionCall(_) => "call",
            SymbolKind::FieldReference => "field",
            SymbolKind::LodExpression(_) => "lod",
            SymbolKind::Expression => "expression",
            SymbolKind::Literal(_) => "literal",
            SymbolKind::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    If,
    Case,
}

impl BlockKind {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            BlockKind::If => "IF",
            BlockKind::Case => "CASE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSymbol {
    pub block_kind: BlockKind,
    /// Set when the block never saw its `END`.
    pub incomplete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    Then,
    Elseif,
    Else,
    When,
}

impl BranchKind {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            BranchKind::Then => "THEN",
            BranchKind::Elseif => "ELSEIF",
            BranchKind::Else => "ELSE",
            BranchKind::When => "WHEN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSymbol {
    pub branch_kind: BranchKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSymbol {
    /// False when the closing parenthesis was never found; arity checks
    /// are suppressed for such calls.
    pub balanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LodType {
    Fixed,
    Include,
    Exclude,
}

impl LodType {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            LodType::Fixed => "FIXED",
            LodType::Include => "INCLUDE",
            LodType::Exclude => "EXCLUDE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LodSymbol {
    pub lod_type: LodType,
    pub has_colon: bool,
    pub has_aggregation: bool,
    /// Set when the closing brace was never found.
    pub incomplete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LitSymbol {
    pub value: LitValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LitValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}
