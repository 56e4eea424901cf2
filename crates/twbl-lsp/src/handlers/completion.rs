use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::{documentation_for, from_lsp_position, to_lsp_position},
    world::{Analysis, World},
};
use itertools::Itertools;
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionParams, CompletionResponse,
    CompletionTextEdit, Documentation, InsertTextFormat, MarkupContent, MarkupKind, TextEdit,
};
use twbl_analysis::DerivedKey;
use twbl_common::environment::Environment;
use twbl_syntax::{Position, SymbolKind};
use url::Url;

pub(crate) const MAX_COMPLETION_ITEMS: usize = 100;

const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "=", "==", "!=", "<", "<=", ">", ">=",
];

const KEYWORDS: &[&str] = &[
    "IF", "THEN", "ELSE", "ELSEIF", "END", "CASE", "WHEN", "AND", "OR", "NOT", "IN", "FIXED",
    "INCLUDE", "EXCLUDE", "TRUE", "FALSE", "NULL",
];

#[tracing::instrument(skip_all)]
pub(crate) async fn completion<E: Environment>(
    context: Context<World<E>>,
    params: Params<CompletionParams>,
) -> Result<Option<CompletionResponse>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document_position.text_document.uri;
    let pos = from_lsp_position(p.text_document_position.position);

    let key = RequestKey::at(RequestKind::Completion, uri.clone(), pos);
    let ctx = context.clone();

    match context
        .scheduler
        .schedule(key, move || completion_impl(ctx, uri, pos))
        .await
    {
        Ok(result) => Ok(result),
        Err(_) => Ok(None),
    }
}

async fn completion_impl<E: Environment>(
    context: Context<World<E>>,
    uri: Url,
    pos: Position,
) -> Option<CompletionResponse> {
    let analysis = context.analysis.read().await;
    let doc = analysis.cache.get(&uri)?;

    let cache_key = DerivedKey {
        uri: uri.clone(),
        position: Some(pos),
        version: doc.version,
    };

    if let Some(hit) = context.derived.lock().completion.get(&cache_key) {
        return hit.clone();
    }

    let line = doc.text.lines().nth(pos.line as usize - 1).unwrap_or("");
    let prefix = utf16_prefix(line, pos.character.saturating_sub(1));

    let result = match completion_context(&prefix) {
        CompletionContext::Field => Some(field_completions(&analysis)),
        CompletionContext::SnippetCommand { start_character } => {
            Some(snippet_command_completions(&analysis, pos, start_character))
        }
        CompletionContext::General { word } => Some(general_completions(&analysis, &word)),
    };

    context
        .derived
        .lock()
        .completion
        .insert(cache_key, result.clone());

    result
}

enum CompletionContext {
    /// Inside an unclosed `[ ... ]`.
    Field,
    /// The line is a `/command`.
    SnippetCommand { start_character: u32 },
    General { word: String },
}

fn completion_context(prefix: &str) -> CompletionContext {
    if let Some(open) = prefix.rfind('[') {
        if !prefix[open..].contains(']') {
            return CompletionContext::Field;
        }
    }

    let trimmed = prefix.trim_start();
    if trimmed.starts_with('/') {
        let leading = prefix.len() - trimmed.len();
        let start_character = prefix[..leading].chars().map(char::len_utf16).sum::<usize>() as u32 + 1;
        return CompletionContext::SnippetCommand { start_character };
    }

    let word: String = prefix
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    CompletionContext::General { word }
}

fn field_completions(analysis: &Analysis) -> CompletionResponse {
    let items: Vec<CompletionItem> = known_fields(analysis)
        .into_iter()
        .map(|name| CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::FIELD),
            insert_text: Some(name),
            ..CompletionItem::default()
        })
        .collect();

    CompletionResponse::List(CompletionList {
        is_incomplete: false,
        items,
    })
}

fn snippet_command_completions(
    analysis: &Analysis,
    pos: Position,
    start_character: u32,
) -> CompletionResponse {
    let replace_range = twbl_syntax::TextRange::new(
        Position::new(pos.line, start_character),
        pos,
    );

    let items: Vec<CompletionItem> = analysis
        .snippets
        .iter()
        .map(|(id, snippet)| CompletionItem {
            label: format!("/{id}"),
            detail: Some(snippet.description.clone()),
            kind: Some(CompletionItemKind::SNIPPET),
            filter_text: Some(format!("/{}", snippet.prefix)),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: lsp_types::Range {
                    start: to_lsp_position(replace_range.start),
                    end: to_lsp_position(replace_range.end),
                },
                new_text: snippet.body.text(),
            })),
            ..CompletionItem::default()
        })
        .collect();

    CompletionResponse::List(CompletionList {
        is_incomplete: false,
        items,
    })
}

fn general_completions(analysis: &Analysis, word: &str) -> CompletionResponse {
    let query = word.to_uppercase();
    let mut scored: Vec<(i64, CompletionItem)> = Vec::new();

    for signature in analysis.catalog.functions() {
        if let Some(score) = match_score(&query, &signature.name, 40) {
            scored.push((
                score,
                CompletionItem {
                    label: signature.name.clone(),
                    detail: Some(signature.label()),
                    documentation: Some(Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: documentation_for(signature),
                    })),
                    kind: Some(CompletionItemKind::FUNCTION),
                    insert_text: Some(format!("{}($0)", signature.name)),
                    insert_text_format: Some(InsertTextFormat::SNIPPET),
                    ..CompletionItem::default()
                },
            ));
        }
    }

    for keyword in KEYWORDS {
        if let Some(score) = match_score(&query, keyword, 30) {
            scored.push((
                score,
                CompletionItem {
                    label: (*keyword).to_string(),
                    kind: Some(CompletionItemKind::KEYWORD),
                    ..CompletionItem::default()
                },
            ));
        }
    }

    for field in known_fields(analysis) {
        if let Some(score) = match_score(&query, &field.to_uppercase(), 20) {
            scored.push((
                score,
                CompletionItem {
                    label: field.clone(),
                    kind: Some(CompletionItemKind::FIELD),
                    insert_text: Some(format!("[{field}]")),
                    ..CompletionItem::default()
                },
            ));
        }
    }

    for op in OPERATORS {
        if let Some(score) = match_score(&query, op, 10) {
            scored.push((
                score,
                CompletionItem {
                    label: (*op).to_string(),
                    kind: Some(CompletionItemKind::OPERATOR),
                    ..CompletionItem::default()
                },
            ));
        }
    }

    for (id, snippet) in analysis.snippets.iter() {
        if let Some(score) = match_score(&query, &snippet.prefix.to_uppercase(), 50) {
            scored.push((
                score,
                CompletionItem {
                    label: id.clone(),
                    detail: Some(snippet.description.clone()),
                    filter_text: Some(snippet.prefix.clone()),
                    kind: Some(CompletionItemKind::SNIPPET),
                    insert_text: Some(snippet.body.text()),
                    insert_text_format: Some(InsertTextFormat::SNIPPET),
                    ..CompletionItem::default()
                },
            ));
        }
    }

    // Collapse duplicates by (label, kind), keeping the best score.
    let mut seen: Vec<(String, Option<CompletionItemKind>)> = Vec::new();
    let mut items = Vec::new();
    let mut truncated = false;

    for (_, mut item) in scored
        .into_iter()
        .sorted_by_key(|(score, _)| std::cmp::Reverse(*score))
    {
        let identity = (item.label.clone(), item.kind);
        if seen.contains(&identity) {
            continue;
        }

        if items.len() >= MAX_COMPLETION_ITEMS {
            truncated = true;
            break;
        }

        item.sort_text = Some(format!("{:05}", items.len()));
        seen.push(identity);
        items.push(item);
    }

    CompletionResponse::List(CompletionList {
        is_incomplete: truncated,
        items,
    })
}

/// Ranking per match class: exact beats prefix beats subsequence beats
/// substring; ties break on the per-kind boost and then name similarity.
fn match_score(query: &str, candidate: &str, kind_boost: i64) -> Option<i64> {
    let class = if query.is_empty() {
        1000
    } else if candidate == query {
        4000
    } else if candidate.starts_with(query) {
        3000
    } else if is_subsequence(query, candidate) {
        2000
    } else if candidate.contains(query) {
        1000
    } else {
        return None;
    };

    let similarity = (strsim::jaro_winkler(query, candidate) * 100.0) as i64;
    Some(class + kind_boost + similarity / 20)
}

fn is_subsequence(query: &str, candidate: &str) -> bool {
    let mut chars = candidate.chars();
    query.chars().all(|q| chars.any(|c| c == q))
}

fn known_fields(analysis: &Analysis) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();

    for (_, doc) in analysis.cache.iter() {
        for (_, data) in doc.parsed.symbols() {
            if matches!(data.kind, SymbolKind::FieldReference) && !fields.contains(&data.name) {
                fields.push(data.name.clone());
            }
        }
    }

    fields.sort();
    fields
}

fn utf16_prefix(line: &str, units: u32) -> String {
    let mut taken = 0_u32;
    let mut out = String::new();

    for c in line.chars() {
        if taken >= units {
            break;
        }
        taken += c.len_utf16() as u32;
        out.push(c);
    }

    out
}
