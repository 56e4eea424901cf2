use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::{from_lsp_position, to_lsp_range},
    world::{Analysis, World},
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{GotoDefinitionParams, GotoDefinitionResponse, Location};
use twbl_common::environment::Environment;
use twbl_syntax::{Position, SymbolKind};
use url::Url;

#[tracing::instrument(skip_all)]
pub(crate) async fn goto_definition<E: Environment>(
    context: Context<World<E>>,
    params: Params<GotoDefinitionParams>,
) -> Result<Option<GotoDefinitionResponse>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document_position_params.text_document.uri;
    let pos = from_lsp_position(p.text_document_position_params.position);

    let key = RequestKey::at(RequestKind::Definition, uri.clone(), pos);
    let ctx = context.clone();

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;
            definition_at(&analysis, &uri, pos)
        })
        .await;

    Ok(result.unwrap_or(None))
}

/// A field reference resolves to the first occurrence of the same field
/// name: in its own document first, then across the other cached ones.
fn definition_at(analysis: &Analysis, uri: &Url, pos: Position) -> Option<GotoDefinitionResponse> {
    let doc = analysis.cache.get(uri)?;
    let id = doc.parsed.symbol_at(pos)?;
    let data = &doc.parsed[id];

    if !matches!(data.kind, SymbolKind::FieldReference) {
        return None;
    }

    let name = &data.name;

    let own = first_field_occurrence(doc, name).map(|range| Location {
        uri: uri.clone(),
        range,
    });

    let location = own.or_else(|| {
        analysis
            .cache
            .iter()
            .filter(|(other, _)| *other != uri)
            .find_map(|(other, other_doc)| {
                first_field_occurrence(other_doc, name).map(|range| Location {
                    uri: other.clone(),
                    range,
                })
            })
    })?;

    Some(GotoDefinitionResponse::Scalar(location))
}

fn first_field_occurrence(
    doc: &twbl_analysis::CachedDocument,
    name: &str,
) -> Option<lsp_types::Range> {
    doc.parsed
        .symbols()
        .filter(|(_, data)| matches!(data.kind, SymbolKind::FieldReference) && data.name == name)
        .map(|(_, data)| data.range)
        .min()
        .map(to_lsp_range)
}
