use crate::{
    lsp_ext::request::{SyntaxTreeParams, SyntaxTreeResult},
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use twbl_common::environment::Environment;

#[tracing::instrument(skip_all)]
pub(crate) async fn syntax_tree<E: Environment>(
    context: Context<World<E>>,
    params: Params<SyntaxTreeParams>,
) -> Result<Option<SyntaxTreeResult>, rpc::Error> {
    let p = params.required()?;

    let analysis = context.analysis.read().await;
    let Some(doc) = analysis.cache.get(&p.uri) else {
        return Ok(None);
    };

    Ok(Some(SyntaxTreeResult {
        text: doc.parsed.debug_tree(),
        tree: doc.parsed.to_json(),
    }))
}
