use crate::{
    scheduler::{RequestKey, RequestKind},
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{FoldingRange, FoldingRangeKind, FoldingRangeParams};
use twbl_common::environment::Environment;
use twbl_syntax::SymbolKind;

#[tracing::instrument(skip_all)]
pub(crate) async fn folding_ranges<E: Environment>(
    context: Context<World<E>>,
    params: Params<FoldingRangeParams>,
) -> Result<Option<Vec<FoldingRange>>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document.uri;
    let key = RequestKey::global(RequestKind::FoldingRanges, uri.clone());
    let ctx = context.clone();

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;
            let doc = analysis.cache.get(&uri)?;

            let ranges: Vec<FoldingRange> = doc
                .parsed
                .symbols()
                .filter(|(_, data)| {
                    matches!(
                        data.kind,
                        SymbolKind::ConditionalBlock(_) | SymbolKind::LodExpression(_)
                    ) && data.range.end.line > data.range.start.line
                })
                .map(|(_, data)| FoldingRange {
                    start_line: data.range.start.line - 1,
                    start_character: None,
                    end_line: data.range.end.line - 1,
                    end_character: None,
                    kind: Some(FoldingRangeKind::Region),
                })
                .collect();

            Some(ranges)
        })
        .await;

    Ok(result.unwrap_or(None))
}
