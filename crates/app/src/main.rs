mod args;
mod op;
mod ops;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Admin, Init, Node, Org, Version};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

command_enum! {
    (Admin, Admin),
    (Init, Init),
    (Node, Node),
    (Org, Org),
    (Version, Version),
}

/// Flag wins over the config file, which wins over the default
fn resolve_log_level(args: &Args) -> tracing::Level {
    let configured = args.log_level.clone().or_else(|| {
        state::AppState::load(args.config_path.clone())
            .ok()
            .map(|state| state.config.log_level)
    });
    configured
        .and_then(|level| level.parse().ok())
        .unwrap_or(tracing::Level::INFO)
}

fn main() {
    let args = Args::parse();

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let env_filter = EnvFilter::builder()
        .with_default_directive(resolve_log_level(&args).into())
        .from_env_lossy();
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(stderr_layer).init();

    let ctx = op::OpContext::new(args.config_path);

    match args.command.execute(&ctx) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            // flush pending log lines before exiting
            drop(guard);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
