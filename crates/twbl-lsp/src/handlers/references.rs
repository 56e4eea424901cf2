use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::{from_lsp_position, to_lsp_range},
    world::{Analysis, World},
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{Location, ReferenceParams};
use twbl_common::environment::Environment;
use twbl_syntax::{Position, SymbolKind};
use url::Url;

#[tracing::instrument(skip_all)]
pub(crate) async fn references<E: Environment>(
    context: Context<World<E>>,
    params: Params<ReferenceParams>,
) -> Result<Option<Vec<Location>>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document_position.text_document.uri;
    let pos = from_lsp_position(p.text_document_position.position);

    let key = RequestKey::at(RequestKind::References, uri.clone(), pos);
    let ctx = context.clone();

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;
            references_at(&analysis, &uri, pos)
        })
        .await;

    Ok(result.unwrap_or(None))
}

/// All occurrences of the same field or function name across the cached
/// documents, via the shared symbol name index.
fn references_at(analysis: &Analysis, uri: &Url, pos: Position) -> Option<Vec<Location>> {
    let doc = analysis.cache.get(uri)?;
    let id = doc.parsed.symbol_at(pos)?;
    let data = &doc.parsed[id];

    let matcher: fn(&SymbolKind) -> bool = match data.kind {
        SymbolKind::FieldReference => |k| matches!(k, SymbolKind::FieldReference),
        SymbolKind::FunctionCall(_) => |k| matches!(k, SymbolKind::FunctionCall(_)),
        _ => return None,
    };
    let name = data.name.clone();

    let mut locations = Vec::new();
    for (other_uri, other_doc) in analysis.cache.iter() {
        for (_, other) in other_doc.parsed.symbols() {
            if matcher(&other.kind) && other.name == name {
                locations.push(Location {
                    uri: other_uri.clone(),
                    range: to_lsp_range(other.range),
                });
            }
        }
    }

    Some(locations)
}
