use std::sync::Arc;

use crate::{
    config::InitConfig,
    handlers::configuration::update_configuration,
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{
    CompletionOptions, FoldingRangeProviderCapability, HoverProviderCapability, InitializeParams,
    InitializeResult, InitializedParams, OneOf, SemanticTokensFullOptions, SemanticTokensLegend,
    SemanticTokensOptions, SemanticTokensServerCapabilities, ServerCapabilities, ServerInfo,
    SignatureHelpOptions, TextDocumentSyncCapability, TextDocumentSyncKind,
};
use twbl_analysis::Catalog;
use twbl_common::environment::Environment;

#[tracing::instrument(skip_all)]
pub(crate) async fn initialize<E: Environment>(
    context: Context<World<E>>,
    params: Params<InitializeParams>,
) -> Result<InitializeResult, rpc::Error> {
    let p = params.required()?;

    if let Some(options) = p.initialization_options {
        match serde_json::from_value::<InitConfig>(options) {
            Ok(config) => context.init_config.store(Arc::new(config)),
            Err(error) => tracing::error!(%error, "invalid initialization options"),
        }
    }

    Ok(InitializeResult {
        capabilities: ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(
                TextDocumentSyncKind::INCREMENTAL,
            )),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            completion_provider: Some(CompletionOptions {
                resolve_provider: Some(false),
                trigger_characters: Some(
                    [".", "[", "(", " ", "\t"]
                        .into_iter()
                        .map(Into::into)
                        .collect(),
                ),
                ..CompletionOptions::default()
            }),
            signature_help_provider: Some(SignatureHelpOptions {
                trigger_characters: Some(
                    ["(", ")", ",", " ", "\t", "\n", "T", "E", "W", "A", "O"]
                        .into_iter()
                        .map(Into::into)
                        .collect(),
                ),
                ..SignatureHelpOptions::default()
            }),
            semantic_tokens_provider: Some(
                SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
                    legend: SemanticTokensLegend {
                        token_types: crate::handlers::semantic_tokens::legend(),
                        token_modifiers: Vec::new(),
                    },
                    full: Some(SemanticTokensFullOptions::Bool(true)),
                    range: None,
                    ..SemanticTokensOptions::default()
                }),
            ),
            document_symbol_provider: Some(OneOf::Left(true)),
            workspace_symbol_provider: Some(OneOf::Left(true)),
            definition_provider: Some(OneOf::Left(true)),
            references_provider: Some(OneOf::Left(true)),
            code_action_provider: Some(lsp_types::CodeActionProviderCapability::Simple(true)),
            // The formatter is registered dynamically once configuration
            // arrives, so clients only see it when `enableFormatting` is on.
            folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
            ..ServerCapabilities::default()
        },
        server_info: Some(ServerInfo {
            name: "twbl-lsp".into(),
            version: Some(env!("CARGO_PKG_VERSION").into()),
        }),
    })
}

#[tracing::instrument(skip_all)]
pub(crate) async fn initialized<E: Environment>(
    context: Context<World<E>>,
    _params: Params<InitializedParams>,
) {
    update_configuration(context.clone()).await;
    crate::handlers::formatting::sync_formatting_registration(context.clone()).await;
    load_definition_catalogue(context.clone()).await;
    spawn_memory_task(context);
}

#[tracing::instrument(skip_all)]
pub(crate) async fn shutdown<E: Environment>(
    context: Context<World<E>>,
    _params: Params<()>,
) -> Result<(), rpc::Error> {
    context.scheduler.flush_all().await;
    Ok(())
}

/// Swap the bundled catalogue for the configured definition file, when one
/// is given and readable. Failures degrade gracefully to the bundled set.
async fn load_definition_catalogue<E: Environment>(context: Context<World<E>>) {
    let from_init = context.init_config.load().definition_file.clone();

    let path = {
        let analysis = context.analysis.read().await;
        from_init.or_else(|| analysis.config.definition_file.clone())
    };

    let Some(path) = path else { return };

    match context.env.read_file(&path).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let catalog = Catalog::parse(&text);
            if catalog.is_empty() {
                tracing::warn!(?path, "definition file contained no declarations");
                return;
            }
            let mut analysis = context.analysis.write().await;
            analysis.catalog = Arc::new(catalog);
            tracing::info!(?path, functions = analysis.catalog.len(), "loaded definition file");
        }
        Err(error) => {
            tracing::warn!(?path, %error, "failed to read definition file, keeping bundled catalogue");
        }
    }
}

/// The periodic memory pass. Runs for the lifetime of the server.
fn spawn_memory_task<E: Environment>(context: Context<World<E>>) {
    let env = context.env.clone();

    context.env.clone().spawn_local(async move {
        loop {
            let tick = {
                let analysis = context.analysis.read().await;
                analysis.memory.settings.tick
            };
            env.sleep(tick).await;

            let report = {
                let mut analysis = context.analysis.write().await;
                let analysis = &mut *analysis;
                analysis.memory.run(&mut analysis.cache)
            };

            if !report.evicted.is_empty() {
                let mut derived = context.derived.lock();
                for uri in &report.evicted {
                    derived.forget(uri);
                    context.scheduler.clear_document_requests(uri);
                }
            }
        }
    });
}
