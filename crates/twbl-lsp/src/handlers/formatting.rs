use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::to_lsp_range,
    world::World,
};
use anyhow::Context as AnyhowContext;
use lsp_async_stub::{rpc, Context, Params, RequestWriter};
use lsp_types::{
    request::{RegisterCapability, UnregisterCapability},
    DocumentFormattingParams, Registration, RegistrationParams, TextEdit, Unregistration,
    UnregistrationParams,
};
use std::sync::atomic::Ordering;
use twbl_common::environment::Environment;
use twbl_syntax::mapper::document_range;

const FORMATTING_REGISTRATION_ID: &str = "twbl-formatting";
const FORMATTING_METHOD: &str = "textDocument/formatting";

#[tracing::instrument(skip_all)]
pub(crate) async fn formatting<E: Environment>(
    context: Context<World<E>>,
    params: Params<DocumentFormattingParams>,
) -> Result<Option<Vec<TextEdit>>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document.uri;
    let tab_size = p.options.tab_size;
    let insert_spaces = p.options.insert_spaces;

    let key = RequestKey::global(RequestKind::Formatting, uri.clone());
    let ctx = context.clone();

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;

            // The capability is registered dynamically, but a request can
            // still race a disabling configuration change.
            if !analysis.config.enable_formatting {
                return None;
            }

            let doc = analysis.cache.get(&uri)?;

            let options =
                twbl_fmt::Options::default().with_editor_settings(tab_size, insert_spaces);
            let formatted = twbl_fmt::format_source(&doc.text, options);

            if formatted == doc.text {
                return Some(Vec::new());
            }

            Some(vec![TextEdit {
                range: to_lsp_range(document_range(&doc.text)),
                new_text: formatted,
            }])
        })
        .await;

    Ok(result.unwrap_or(None))
}

/// Register or unregister `textDocument/formatting` with the client so the
/// advertised capability tracks `enableFormatting`. Called after the
/// initial configuration pull and on every configuration change.
#[tracing::instrument(skip_all)]
pub(crate) async fn sync_formatting_registration<E: Environment>(context: Context<World<E>>) {
    let enabled = context.analysis.read().await.config.enable_formatting;
    let registered = context.formatting_registered.load(Ordering::SeqCst);

    if enabled == registered {
        return;
    }

    let res = if enabled {
        context
            .clone()
            .write_request::<RegisterCapability, _>(Some(RegistrationParams {
                registrations: vec![Registration {
                    id: FORMATTING_REGISTRATION_ID.into(),
                    method: FORMATTING_METHOD.into(),
                    register_options: None,
                }],
            }))
            .await
            .context("failed to register the formatter")
            .and_then(|res| {
                res.into_result()
                    .context("client rejected the formatter registration")
            })
    } else {
        context
            .clone()
            .write_request::<UnregisterCapability, _>(Some(UnregistrationParams {
                unregisterations: vec![Unregistration {
                    id: FORMATTING_REGISTRATION_ID.into(),
                    method: FORMATTING_METHOD.into(),
                }],
            }))
            .await
            .context("failed to unregister the formatter")
            .and_then(|res| {
                res.into_result()
                    .context("client rejected the formatter unregistration")
            })
    };

    match res {
        Ok(()) => {
            context
                .formatting_registered
                .store(enabled, Ordering::SeqCst);
        }
        Err(error) => {
            tracing::error!(?error, enabled, "formatter registration update failed");
        }
    }
}
