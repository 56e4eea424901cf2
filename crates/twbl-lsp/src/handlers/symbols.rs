use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::to_lsp_range,
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{
    DocumentSymbol, DocumentSymbolParams, DocumentSymbolResponse, Location, SymbolInformation,
    SymbolKind as LspSymbolKind, WorkspaceSymbolParams,
};
use once_cell::sync::Lazy;
use twbl_common::environment::Environment;
use twbl_syntax::{ParsedDocument, SymbolId, SymbolKind};
use url::Url;

#[tracing::instrument(skip_all)]
pub(crate) async fn document_symbols<E: Environment>(
    context: Context<World<E>>,
    params: Params<DocumentSymbolParams>,
) -> Result<Option<DocumentSymbolResponse>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document.uri;
    let key = RequestKey::global(RequestKind::DocumentSymbols, uri.clone());
    let ctx = context.clone();

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;
            let doc = analysis.cache.get(&uri)?;

            let symbols = collect_document_symbols(&doc.parsed, doc.parsed.root());
            Some(DocumentSymbolResponse::Nested(symbols))
        })
        .await;

    Ok(result.unwrap_or(None))
}

#[tracing::instrument(skip_all)]
pub(crate) async fn workspace_symbols<E: Environment>(
    context: Context<World<E>>,
    params: Params<WorkspaceSymbolParams>,
) -> Result<Option<Vec<SymbolInformation>>, rpc::Error> {
    let p = params.required()?;

    let key = RequestKey::global(RequestKind::WorkspaceSymbols, WORKSPACE_SCOPE_URL.clone());
    let ctx = context.clone();
    let query = p.query;

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;
            let needle = query.to_uppercase();
            let mut out = Vec::new();

            for (uri, doc) in analysis.cache.iter() {
                for (id, data) in doc.parsed.symbols() {
                    if id == doc.parsed.root() {
                        continue;
                    }

                    let Some(kind) = information_kind(&data.kind) else {
                        continue;
                    };

                    if !needle.is_empty() && !data.name.to_uppercase().contains(&needle) {
                        continue;
                    }

                    out.push(information(
                        data.name.clone(),
                        kind,
                        uri.clone(),
                        to_lsp_range(data.range),
                    ));
                }
            }

            Some(out)
        })
        .await;

    Ok(result.unwrap_or(None))
}

fn collect_document_symbols(parsed: &ParsedDocument, id: SymbolId) -> Vec<DocumentSymbol> {
    let mut out = Vec::new();

    for &child in &parsed[id].children {
        let data = &parsed[child];

        match document_kind(&data.kind) {
            Some(kind) => {
                let children = collect_document_symbols(parsed, child);
                out.push(document_symbol(data, kind, children));
            }
            // Transparent nodes contribute their children in place.
            None => out.extend(collect_document_symbols(parsed, child)),
        }
    }

    out
}

fn document_kind(kind: &SymbolKind) -> Option<LspSymbolKind> {
    match kind {
        SymbolKind::ConditionalBlock(_) => Some(LspSymbolKind::CLASS),
        SymbolKind::Branch(_) => Some(LspSymbolKind::METHOD),
        SymbolKind::FunctionCall(_) => Some(LspSymbolKind::FUNCTION),
        SymbolKind::FieldReference => Some(LspSymbolKind::FIELD),
        SymbolKind::LodExpression(_) => Some(LspSymbolKind::NAMESPACE),
        _ => None,
    }
}

fn information_kind(kind: &SymbolKind) -> Option<LspSymbolKind> {
    match kind {
        SymbolKind::ConditionalBlock(_) => Some(LspSymbolKind::CLASS),
        SymbolKind::FunctionCall(_) => Some(LspSymbolKind::FUNCTION),
        SymbolKind::FieldReference => Some(LspSymbolKind::FIELD),
        SymbolKind::LodExpression(_) => Some(LspSymbolKind::NAMESPACE),
        _ => None,
    }
}

#[allow(deprecated)]
fn document_symbol(
    data: &twbl_syntax::SymbolData,
    kind: LspSymbolKind,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    let name = if data.name.is_empty() {
        data.kind.tag().to_string()
    } else {
        data.name.clone()
    };

    DocumentSymbol {
        name,
        detail: None,
        kind,
        tags: None,
        deprecated: None,
        range: to_lsp_range(data.range),
        selection_range: to_lsp_range(data.range),
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

#[allow(deprecated)]
fn information(
    name: String,
    kind: LspSymbolKind,
    uri: Url,
    range: lsp_types::Range,
) -> SymbolInformation {
    SymbolInformation {
        name,
        kind,
        tags: None,
        deprecated: None,
        location: Location { uri, range },
        container_name: None,
    }
}

/// Requests that are not tied to any document share this scheduling scope.
static WORKSPACE_SCOPE_URL: Lazy<Url> =
    Lazy::new(|| "twbl://workspace".parse().expect("static url must parse"));
