mod fmt;
mod lsp;

use crate::{args::RootCommand, Twbl};
use twbl_common::environment::Environment;

impl<E: Environment> Twbl<E> {
    pub async fn execute(&mut self, cmd: RootCommand) -> Result<(), anyhow::Error> {
        match cmd {
            RootCommand::Lsp { cmd } => self.execute_lsp(cmd).await,
            RootCommand::Fmt(cmd) => self.execute_fmt(cmd).await,
        }
    }
}
