use crate::{
    scheduler::{RequestKey, RequestKind},
    utils::{from_lsp_position, to_lsp_position, to_lsp_range},
    world::World,
};
use lsp_async_stub::{rpc, Context, Params};
use lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionParams, CodeActionResponse,
    TextEdit, WorkspaceEdit,
};
use twbl_common::environment::Environment;
use twbl_syntax::{lexer::tokenize_with_trivia, TextRange};
use url::Url;

#[tracing::instrument(skip_all)]
pub(crate) async fn code_actions<E: Environment>(
    context: Context<World<E>>,
    params: Params<CodeActionParams>,
) -> Result<Option<CodeActionResponse>, rpc::Error> {
    let p = params.required()?;

    let uri = p.text_document.uri;
    let pos = from_lsp_position(p.range.start);
    let requested = TextRange::new(pos, from_lsp_position(p.range.end));

    let key = RequestKey::at(RequestKind::CodeAction, uri.clone(), pos);
    let ctx = context.clone();

    let result = context
        .scheduler
        .schedule(key, move || async move {
            let analysis = ctx.analysis.read().await;
            let doc = analysis.cache.get(&uri)?;

            let mut actions = CodeActionResponse::new();

            // Unclosed blocks intersecting the request get an END inserted.
            for diagnostic in &doc.diagnostics {
                if diagnostic.code != "unclosed-block" || !ranges_touch(diagnostic.range, requested)
                {
                    continue;
                }

                actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                    title: "Insert missing END".into(),
                    kind: Some(CodeActionKind::QUICKFIX),
                    edit: Some(edit_for(
                        &uri,
                        vec![TextEdit {
                            range: lsp_types::Range {
                                start: to_lsp_position(diagnostic.range.end),
                                end: to_lsp_position(diagnostic.range.end),
                            },
                            new_text: "\nEND".into(),
                        }],
                    )),
                    ..CodeAction::default()
                }));
            }

            // Lower or mixed case keywords in range can be normalized.
            let edits: Vec<TextEdit> = tokenize_with_trivia(&doc.text)
                .into_iter()
                .filter(|t| t.kind.is_keyword() && ranges_touch(t.range, requested))
                .filter(|t| t.text.chars().any(char::is_lowercase))
                .map(|t| TextEdit {
                    range: to_lsp_range(t.range),
                    new_text: t.text.to_uppercase(),
                })
                .collect();

            if !edits.is_empty() {
                actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                    title: "Uppercase keywords".into(),
                    kind: Some(CodeActionKind::QUICKFIX),
                    edit: Some(edit_for(&uri, edits)),
                    ..CodeAction::default()
                }));
            }

            if actions.is_empty() {
                None
            } else {
                Some(actions)
            }
        })
        .await;

    Ok(result.unwrap_or(None))
}

fn edit_for(uri: &Url, edits: Vec<TextEdit>) -> WorkspaceEdit {
    WorkspaceEdit {
        changes: Some([(uri.clone(), edits)].into_iter().collect()),
        ..WorkspaceEdit::default()
    }
}

fn ranges_touch(a: TextRange, b: TextRange) -> bool {
    a.start <= b.end && b.start <= a.end
}
