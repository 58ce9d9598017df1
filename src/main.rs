#![allow(dead_code)]

use chatterlang::chatterlang::compile;
use chatterlang::item::Item;
use chatterlang::registry;
use chatterlang::server::{self, config::ServerArgs};
use clap::Parser;

/// ChatterLang - A small textual DSL for streaming dataflow pipelines
#[derive(Parser)]
#[command(name = "chatterlang")]
#[command(author = "Keith Bugeja <keith.bugeja@um.edu.mt>")]
#[command(version = "0.1.0")]
#[command(about = "ChatterLang: a streaming dataflow engine with a small textual DSL")]
struct Cli {
    /// Path to a ChatterLang script file. Mutually exclusive with
    /// `--script-source`; if neither is given, stdin is read as the script.
    #[arg(short, long)]
    script: Option<String>,

    /// Inline ChatterLang script source, used when `--script` is absent.
    #[arg(long)]
    script_source: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// List available source types
    #[arg(long)]
    list_sources: bool,

    /// List available segment types
    #[arg(long)]
    list_segments: bool,

    /// Host the script as a session-isolated streaming HTTP service instead
    /// of running it once to completion.
    #[arg(long)]
    serve: bool,

    /// TCP port for `--serve`.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 32)]
async fn main() {
    let cli = Cli::parse();

    chatterlang::logging::init_logging(&cli.log_level);

    if cli.list_sources {
        println!("Available source types:");
        for name in registry::list_sources() {
            println!("  - {name}");
        }
        return;
    }

    if cli.list_segments {
        println!("Available segment types:");
        for name in registry::list_segments() {
            println!("  - {name}");
        }
        return;
    }

    if cli.serve {
        let args = ServerArgs {
            script: cli.script,
            script_source: cli.script_source,
            port: cli.port,
            log_level: cli.log_level,
        };
        if let Err(e) = server::serve(args).await {
            tracing::error!("server failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    let source = match (cli.script, cli.script_source) {
        (Some(path), _) => match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!("failed to read script file '{path}': {e}");
                std::process::exit(1);
            }
        },
        (None, Some(inline)) => inline,
        (None, None) => {
            use std::io::Read;
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                tracing::error!("failed to read script from stdin: {e}");
                std::process::exit(1);
            }
            buf
        }
    };

    let compiled = match compile(&source, None) {
        Ok(compiled) => compiled,
        Err(e) => {
            tracing::error!("failed to compile script: {e}");
            std::process::exit(1);
        }
    };

    for item in compiled.run(Vec::new()) {
        if let Item::Data(value) = item {
            println!("{value}");
        }
    }
}
