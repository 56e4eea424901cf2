use clap::Parser;
use std::{io, process};
use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};
use twbl_cli::{
    args::{Colors, TwblArgs},
    Twbl,
};
use twbl_common::environment::native::NativeEnvironment;

#[tokio::main]
async fn main() {
    let args = TwblArgs::parse();

    setup_logging(&args);

    let mut app = Twbl::new(NativeEnvironment);

    if let Err(error) = app.execute(args.cmd).await {
        tracing::error!(%error, "operation failed");
        process::exit(1);
    }

    process::exit(0);
}

fn setup_logging(args: &TwblArgs) {
    let colors = match args.colors {
        Colors::Auto => atty::is(atty::Stream::Stderr),
        Colors::Always => true,
        Colors::Never => false,
    };

    let span_events = if args.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(tracing::Level::INFO.into()));

    let registry = tracing_subscriber::registry().with(env_filter);

    if args.verbose {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(colors)
                    .with_writer(io::stderr)
                    .with_span_events(span_events)
                    .pretty(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(colors)
                    .with_writer(io::stderr)
                    .with_span_events(span_events)
                    .compact(),
            )
            .init();
    }
}
