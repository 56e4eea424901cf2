use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::{documentation_for, documentation_for_type, from_lsp_position, to_lsp_range},
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{Hover, HoverContents, HoverParams, MarkupContent, MarkupKind};
use twbl_analysis::{CachedDocument, Catalog, DerivedKey};
use twbl_common::environment::Environment;
use twbl_syntax::{Position, SymbolKind};
use url::Url;

#[tracing::instrument(skip_all)]
pub(crate) async fn hover<E: Environment>(
    context: Context<World<E>>,
    params: Params<HoverParams>,
) -> Result<Option<Hover>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document_position_params.text_document.uri;
    let pos = from_lsp_position(p.text_document_position_params.position);

    let key = RequestKey::at(RequestKind::Hover, uri.clone(), pos);
    let ctx = context.clone();

    match context
        .scheduler
        .schedule(key, move || hover_impl(ctx, uri, pos))
        .await
    {
        Ok(result) => Ok(result),
        Err(_) => Ok(None),
    }
}

async fn hover_impl<E: Environment>(
    context: Context<World<E>>,
    uri: Url,
    pos: Position,
) -> Option<Hover> {
    let analysis = context.analysis.read().await;
    let doc = analysis.cache.get(&uri)?;

    let cache_key = DerivedKey {
        uri: uri.clone(),
        position: Some(pos),
        version: doc.version,
    };

    if let Some(hit) = context.derived.lock().hover.get(&cache_key) {
        return hit.clone();
    }

    let result = hover_at(doc, &analysis.catalog, pos);
    context
        .derived
        .lock()
        .hover
        .insert(cache_key, result.clone());

    result
}

fn hover_at(doc: &CachedDocument, catalog: &Catalog, pos: Position) -> Option<Hover> {
    let id = doc.parsed.symbol_at(pos)?;
    let data = &doc.parsed[id];

    let markdown = match &data.kind {
        SymbolKind::FunctionCall(_) => documentation_for(catalog.function(&data.name)?),
        SymbolKind::FieldReference => documentation_for_type(catalog.type_def(&data.name)?),
        _ => return None,
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown,
        }),
        range: Some(to_lsp_range(data.range)),
    })
}
