use crate::{
    scheduler::{RequestKey, RequestKind},
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{
    SemanticToken, SemanticTokenType, SemanticTokens, SemanticTokensParams, SemanticTokensResult,
};
use twbl_analysis::Catalog;
use twbl_common::environment::Environment;
use twbl_syntax::{
    lexer::{tokenize_with_trivia, Token, TokenKind},
    Position,
};
use url::Url;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
pub(crate) enum TokenType {
    Keyword,
    Function,
    Variable,
    Constant,
    Operator,
    String,
    Comment,
}

pub(crate) fn legend() -> Vec<SemanticTokenType> {
    vec![
        SemanticTokenType::KEYWORD,
        SemanticTokenType::FUNCTION,
        SemanticTokenType::VARIABLE,
        SemanticTokenType::new("constant"),
        SemanticTokenType::OPERATOR,
        SemanticTokenType::STRING,
        SemanticTokenType::COMMENT,
    ]
}

#[tracing::instrument(skip_all)]
pub(crate) async fn semantic_tokens<E: Environment>(
    context: Context<World<E>>,
    params: Params<SemanticTokensParams>,
) -> Result<Option<SemanticTokensResult>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document.uri;
    let key = RequestKey::global(RequestKind::SemanticTokens, uri.clone());
    let ctx = context.clone();

    match context
        .scheduler
        .schedule(key, move || semantic_tokens_impl(ctx, uri))
        .await
    {
        Ok(result) => Ok(result),
        Err(_) => Ok(None),
    }
}

async fn semantic_tokens_impl<E: Environment>(
    context: Context<World<E>>,
    uri: Url,
) -> Option<SemanticTokensResult> {
    let analysis = context.analysis.read().await;
    let doc = analysis.cache.get(&uri)?;

    let mut builder = TokensBuilder::default();

    for token in tokenize_with_trivia(&doc.text) {
        let Some(ty) = classify(&token, &analysis.catalog) else {
            continue;
        };
        builder.push(&token, ty);
    }

    Some(SemanticTokensResult::Tokens(SemanticTokens {
        result_id: None,
        data: builder.finish(),
    }))
}

fn classify(token: &Token, catalog: &Catalog) -> Option<TokenType> {
    let kind = token.kind;

    if kind.is_keyword() {
        return Some(TokenType::Keyword);
    }

    match kind {
        TokenKind::Identifier => {
            // Catalogued names highlight as functions, the rest as plain
            // variables.
            if catalog.function(token.text).is_some() {
                Some(TokenType::Function)
            } else {
                Some(TokenType::Variable)
            }
        }
        TokenKind::FieldReference => Some(TokenType::Variable),
        TokenKind::Number | TokenKind::True | TokenKind::False | TokenKind::Null => {
            Some(TokenType::Constant)
        }
        TokenKind::String => Some(TokenType::String),
        TokenKind::CommentLine | TokenKind::CommentBlock => Some(TokenType::Comment),
        kind if kind.is_operator() => Some(TokenType::Operator),
        _ => None,
    }
}

#[derive(Default)]
struct TokensBuilder {
    data: Vec<SemanticToken>,
    prev: Option<Position>,
}

impl TokensBuilder {
    /// Tokens arrive in source order; encode them relative to the previous
    /// one. Tokens spanning lines are clamped to their first line.
    fn push(&mut self, token: &Token, ty: TokenType) {
        let start = token.range.start;

        let length = if token.range.end.line > start.line {
            first_line_utf16_len(token.text)
        } else {
            token.range.end.character - start.character
        };

        let (delta_line, delta_start) = match self.prev {
            None => (start.line - 1, start.character - 1),
            Some(prev) => {
                if prev.line == start.line {
                    (0, start.character - prev.character)
                } else {
                    (start.line - prev.line, start.character - 1)
                }
            }
        };

        self.data.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type: ty as u32,
            token_modifiers_bitset: 0,
        });

        self.prev = Some(start);
    }

    fn finish(self) -> Vec<SemanticToken> {
        self.data
    }
}

fn first_line_utf16_len(text: &str) -> u32 {
    text.lines()
        .next()
        .unwrap_or("")
        .chars()
        .map(|c| c.len_utf16() as u32)
        .sum()
}
