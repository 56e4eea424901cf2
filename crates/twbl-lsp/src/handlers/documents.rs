use lsp_async_stub::{Context, Params};
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, Url,
};
use twbl_analysis::UpdateOutcome;
use twbl_common::environment::Environment;

use crate::{
    diagnostics::{clear_diagnostics, publish_diagnostics},
    utils::apply_document_changes,
    world::{Analysis, World},
};

#[tracing::instrument(skip_all)]
pub(crate) async fn document_open<E: Environment>(
    context: Context<World<E>>,
    params: Params<DidOpenTextDocumentParams>,
) {
    let Some(p) = params.optional() else { return };

    let uri = p.text_document.uri;

    let changed = {
        let mut analysis = context.analysis.write().await;
        let analysis = &mut *analysis;
        let changed = ingest(analysis, &uri, p.text_document.text, p.text_document.version);
        analysis.cache.mark_active(&uri);
        changed
    };

    if changed {
        context.derived.lock().bump(&uri);
    }

    publish_diagnostics(context, uri).await;
}

#[tracing::instrument(skip_all)]
pub(crate) async fn document_change<E: Environment>(
    context: Context<World<E>>,
    params: Params<DidChangeTextDocumentParams>,
) {
    let Some(p) = params.optional() else { return };

    let uri = p.text_document.uri;

    // Incremental sync: the change events splice into the cached text.
    // Everything from read to driver update happens under one write guard
    // so concurrent changes to the same document cannot interleave.
    let changed = {
        let mut analysis = context.analysis.write().await;
        let analysis = &mut *analysis;

        let mut text = analysis
            .cache
            .get(&uri)
            .map(|doc| doc.text.clone())
            .unwrap_or_default();
        apply_document_changes(&mut text, &p.content_changes);

        ingest(analysis, &uri, text, p.text_document.version)
    };

    if changed {
        context.derived.lock().bump(&uri);
    }

    publish_diagnostics(context, uri).await;
}

#[tracing::instrument(skip_all)]
pub(crate) async fn document_save<E: Environment>(
    _context: Context<World<E>>,
    _params: Params<DidSaveTextDocumentParams>,
) {
    // Nothing to do; analysis tracks the live buffer.
}

#[tracing::instrument(skip_all)]
pub(crate) async fn document_close<E: Environment>(
    context: Context<World<E>>,
    params: Params<DidCloseTextDocumentParams>,
) {
    let Some(p) = params.optional() else { return };

    let uri = p.text_document.uri;

    {
        let mut analysis = context.analysis.write().await;
        // Kept in the cache until the memory manager elects to drop it.
        analysis.cache.mark_inactive(&uri);
    }

    context.scheduler.clear_document_requests(&uri);
    clear_diagnostics(context, uri).await;
}

/// Ingest one document version: run the incremental driver and refresh the
/// diagnostics. Returns whether the snapshot advanced, in which case the
/// caller fires the post-commit hook that invalidates provider caches.
fn ingest(analysis: &mut Analysis, uri: &Url, text: String, version: i32) -> bool {
    let outcome = analysis.driver.update(&mut analysis.cache, uri, &text, version);

    if matches!(outcome, UpdateOutcome::Unchanged | UpdateOutcome::Stale) {
        return false;
    }

    let settings = analysis.config.diagnostics_settings();
    let catalog = analysis.catalog.clone();
    if let Some(doc) = analysis.cache.get_mut(uri) {
        doc.diagnostics =
            twbl_analysis::diagnostics::compute(&doc.text, &doc.parsed, &catalog, &settings);
    }

    true
}
