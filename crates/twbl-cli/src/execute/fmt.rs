use std::path::Path;

use anyhow::{anyhow, Context};
use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term,
    term::termcolor::{ColorChoice, StandardStream},
};
use twbl_common::{environment::Environment, util};
use twbl_syntax::{ParseError, Parser, Position};

use crate::{args::FmtCommand, Twbl};

impl<E: Environment> Twbl<E> {
    pub async fn execute_fmt(&mut self, cmd: FmtCommand) -> Result<(), anyhow::Error> {
        let cwd = self.env.cwd().context("invalid working directory")?;

        let pattern = match cmd.files {
            Some(files) if self.env.is_dir(Path::new(&files)) => {
                util::calculation_glob(Path::new(&files))
            }
            Some(files) => files,
            None => util::calculation_glob(&cwd),
        };

        let files = self.env.glob_files(&pattern)?;

        if files.is_empty() {
            tracing::warn!(%pattern, "no calculation files matched");
            return Ok(());
        }

        let mut result = Ok(());

        for path in files {
            let bytes = self.env.read_file(&path).await?;
            let source = String::from_utf8_lossy(&bytes).into_owned();

            let parsed = Parser::new(&source).parse();

            if !parsed.errors.is_empty() {
                print_parse_errors(&path, &source, &parsed.errors)?;

                if !cmd.force {
                    result = if cmd.check {
                        Err(anyhow!("some files had syntax errors"))
                    } else {
                        Err(anyhow!("some files were not formatted due to syntax errors"))
                    };
                    continue;
                }
            }

            let formatted = twbl_fmt::format_source(&source, twbl_fmt::Options::default());

            if source != formatted {
                if cmd.check {
                    tracing::error!(path = ?path, "the file is not properly formatted");
                    result = Err(anyhow!("some files were not properly formatted"));
                } else {
                    self.env.write_file(&path, formatted.as_bytes()).await?;
                }
            }
        }

        result
    }
}

fn print_parse_errors(
    path: &Path,
    source: &str,
    errors: &[ParseError],
) -> Result<(), anyhow::Error> {
    let file = SimpleFile::new(path.to_string_lossy(), source);
    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = term::Config::default();

    for error in errors {
        let start = byte_offset(source, error.range.start);
        let end = byte_offset(source, error.range.end).max(start);

        let diagnostic = Diagnostic::error()
            .with_message(error.to_string())
            .with_labels(vec![Label::primary((), start..end)]);

        term::emit(&mut writer.lock(), &config, &file, &diagnostic)?;
    }

    Ok(())
}

/// 1-based UTF-16 line/column to a byte offset into `source`.
fn byte_offset(source: &str, pos: Position) -> usize {
    let mut offset = 0_usize;

    for (index, line) in source.split_inclusive('\n').enumerate() {
        if index as u32 + 1 == pos.line {
            let mut units = 1_u32;
            for (byte_in_line, c) in line.char_indices() {
                if units >= pos.character {
                    return offset + byte_in_line;
                }
                units += c.len_utf16() as u32;
            }
            return offset + line.trim_end_matches(['\n', '\r']).len();
        }
        offset += line.len();
    }

    source.len()
}
