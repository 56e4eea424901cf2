#![allow(clippy::module_name_repetitions)]

use crate::{
    utils::{to_lsp_range, to_lsp_severity},
    world::World,
};
use lsp_async_stub::{Context, RequestWriter};
use lsp_types::{notification, Diagnostic, NumberOrString, PublishDiagnosticsParams, Url};
use tracing::error;
use twbl_common::environment::Environment;

/// Push the cached diagnostics of one document to the client.
pub(crate) async fn publish_diagnostics<E: Environment>(mut context: Context<World<E>>, uri: Url) {
    let (diagnostics, version) = {
        let analysis = context.analysis.read().await;
        let Some(doc) = analysis.cache.get(&uri) else {
            return;
        };

        let diagnostics = doc
            .diagnostics
            .iter()
            .map(|d| Diagnostic {
                range: to_lsp_range(d.range),
                severity: Some(to_lsp_severity(d.severity)),
                code: Some(NumberOrString::String(d.code.to_string())),
                code_description: None,
                source: Some("TabCalc".into()),
                message: d.message.clone(),
                related_information: None,
                tags: None,
                data: None,
            })
            .collect::<Vec<_>>();

        (diagnostics, doc.version)
    };

    context
        .write_notification::<notification::PublishDiagnostics, _>(Some(PublishDiagnosticsParams {
            uri,
            diagnostics,
            version: Some(version),
        }))
        .await
        .unwrap_or_else(|error| error!(%error, "failed to publish diagnostics"));
}

/// Remove all diagnostics for a closed or dropped document.
pub(crate) async fn clear_diagnostics<E: Environment>(mut context: Context<World<E>>, uri: Url) {
    context
        .write_notification::<notification::PublishDiagnostics, _>(Some(PublishDiagnosticsParams {
            uri,
            diagnostics: Vec::new(),
            version: None,
        }))
        .await
        .unwrap_or_else(|error| error!(%error, "failed to clear diagnostics"));
}
