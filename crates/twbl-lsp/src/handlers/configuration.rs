use crate::world::World;
use anyhow::Context as AnyhowContext;
use lsp_async_stub::{Context, Params, RequestWriter};
use lsp_types::{
    request::WorkspaceConfiguration, ConfigurationItem, ConfigurationParams,
    DidChangeConfigurationParams,
};
use twbl_common::environment::Environment;

#[tracing::instrument(skip_all)]
pub(crate) async fn configuration_change<E: Environment>(
    context: Context<World<E>>,
    params: Params<DidChangeConfigurationParams>,
) {
    let Some(p) = params.optional() else { return };

    {
        let mut analysis = context.analysis.write().await;
        if let Err(error) = analysis.config.update_from_json(&p.settings) {
            tracing::error!(?error, "invalid configuration");
        }
        analysis.apply_config();
        context
            .scheduler
            .update_settings(analysis.config.scheduler_settings());
    }

    crate::handlers::formatting::sync_formatting_registration(context).await;
}

/// Pull our configuration section from the client.
#[tracing::instrument(skip_all)]
pub(crate) async fn update_configuration<E: Environment>(context: Context<World<E>>) {
    let section = context.init_config.load().configuration_section.clone();

    let res = context
        .clone()
        .write_request::<WorkspaceConfiguration, _>(Some(ConfigurationParams {
            items: vec![ConfigurationItem {
                scope_uri: None,
                section: Some(section),
            }],
        }))
        .await
        .context("failed to fetch configuration")
        .and_then(|res| res.into_result().context("invalid configuration response"));

    match res {
        Ok(configs) => {
            let Some(config) = configs.into_iter().next() else {
                return;
            };
            if config.is_object() {
                let mut analysis = context.analysis.write().await;
                if let Err(error) = analysis.config.update_from_json(&config) {
                    tracing::error!(?error, "invalid configuration");
                }
                analysis.apply_config();
                context
                    .scheduler
                    .update_settings(analysis.config.scheduler_settings());
            }
            // Registration sync happens in `initialized`, right after this
            // pull completes.
        }
        Err(error) => {
            tracing::error!(?error, "failed to fetch configuration");
        }
    }
}
