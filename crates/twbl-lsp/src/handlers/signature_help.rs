use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::{documentation_for, from_lsp_position},
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{
    Documentation, MarkupContent, MarkupKind, ParameterInformation, ParameterLabel, SignatureHelp,
    SignatureHelpParams, SignatureInformation,
};
use twbl_analysis::{CachedDocument, Catalog, DerivedKey};
use twbl_common::environment::Environment;
use twbl_syntax::{Position, SymbolId, SymbolKind};
use url::Url;

#[tracing::instrument(skip_all)]
pub(crate) async fn signature_help<E: Environment>(
    context: Context<World<E>>,
    params: Params<SignatureHelpParams>,
) -> Result<Option<SignatureHelp>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document_position_params.text_document.uri;
    let pos = from_lsp_position(p.text_document_position_params.position);

    let key = RequestKey::at(RequestKind::SignatureHelp, uri.clone(), pos);
    let ctx = context.clone();

    match context
        .scheduler
        .schedule(key, move || signature_help_impl(ctx, uri, pos))
        .await
    {
        Ok(result) => Ok(result),
        Err(_) => Ok(None),
    }
}

async fn signature_help_impl<E: Environment>(
    context: Context<World<E>>,
    uri: Url,
    pos: Position,
) -> Option<SignatureHelp> {
    let analysis = context.analysis.read().await;
    let doc = analysis.cache.get(&uri)?;

    let cache_key = DerivedKey {
        uri: uri.clone(),
        position: Some(pos),
        version: doc.version,
    };

    if let Some(hit) = context.derived.lock().signature.get(&cache_key) {
        return hit.clone();
    }

    let result = signature_at(doc, &analysis.catalog, pos);
    context
        .derived
        .lock()
        .signature
        .insert(cache_key, result.clone());

    result
}

fn signature_at(doc: &CachedDocument, catalog: &Catalog, pos: Position) -> Option<SignatureHelp> {
    if let Some(call) = enclosing_call(doc, pos) {
        let data = &doc.parsed[call];
        if let Some(signature) = catalog.function(&data.name) {
            let active = active_argument(doc, call, pos);

            return Some(SignatureHelp {
                signatures: vec![SignatureInformation {
                    label: signature.label(),
                    documentation: Some(Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: documentation_for(signature),
                    })),
                    parameters: Some(
                        signature
                            .parameters
                            .iter()
                            .map(|p| ParameterInformation {
                                label: ParameterLabel::Simple(p.name.clone()),
                                documentation: if p.doc.is_empty() {
                                    None
                                } else {
                                    Some(Documentation::String(p.doc.clone()))
                                },
                            })
                            .collect(),
                    ),
                    active_parameter: None,
                }],
                active_signature: Some(0),
                active_parameter: Some(active),
            });
        }
    }

    block_signature(doc, pos)
}

/// The innermost function call whose range contains the cursor. Deeper
/// wins when calls nest.
fn enclosing_call(doc: &CachedDocument, pos: Position) -> Option<SymbolId> {
    let mut current = doc.parsed.symbol_at(pos);

    while let Some(id) = current {
        if matches!(doc.parsed[id].kind, SymbolKind::FunctionCall(_)) {
            return Some(id);
        }
        current = doc.parsed[id].parent;
    }

    None
}

/// Active parameter index: the argument containing the cursor, or the
/// count of arguments that already ended before it.
fn active_argument(doc: &CachedDocument, call: SymbolId, pos: Position) -> u32 {
    let data = &doc.parsed[call];

    for (index, argument) in data.arguments.iter().enumerate() {
        if argument.range.contains_inclusive(pos) {
            return index as u32;
        }
    }

    data.arguments
        .iter()
        .filter(|a| a.range.end <= pos)
        .count() as u32
}

/// Inside an `IF`/`CASE` block (and outside any call), the signature shows
/// the block's branches with the one under the cursor highlighted. The
/// deepest enclosing block wins.
fn block_signature(doc: &CachedDocument, pos: Position) -> Option<SignatureHelp> {
    let block = doc.parsed.enclosing_block_at(pos)?;
    let data = &doc.parsed[block];

    let branches: Vec<SymbolId> = data
        .children
        .iter()
        .copied()
        .filter(|&c| doc.parsed[c].is_branch())
        .collect();

    if branches.is_empty() {
        return None;
    }

    let branch_labels: Vec<String> = branches
        .iter()
        .map(|&b| first_line(&doc.parsed[b].text))
        .collect();

    let active = branches
        .iter()
        .position(|&b| doc.parsed[b].range.contains_inclusive(pos))
        .unwrap_or(0) as u32;

    let label = format!("{} {}", data.name, branch_labels.join(" "));

    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label,
            documentation: Some(Documentation::String(format!(
                "{} block with {} branch{}",
                data.name,
                branches.len(),
                if branches.len() == 1 { "" } else { "es" }
            ))),
            parameters: Some(
                branch_labels
                    .into_iter()
                    .map(|l| ParameterInformation {
                        label: ParameterLabel::Simple(l),
                        documentation: None,
                    })
                    .collect(),
            ),
            active_parameter: None,
        }],
        active_signature: Some(0),
        active_parameter: Some(active),
    })
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}
