use clap::{Parser, Subcommand};
use std::sync::Arc;

use rapid_align::cmdline;
use rapid_align::context::AlignerContext;
use rapid_align::engine::PassthroughEngine;
use rapid_align::extension::{AlignerExtension, NoopExtension};
use rapid_align::index::{DirectoryIndexProvider, IndexCache};
use rapid_align::input::ExtensionRecognizer;
use rapid_align::io::FormatRegistry;
use rapid_align::run_opt::{self, DefaultOptionParser};

#[derive(Parser)]
#[command(name = "rapid-align")]
#[command(about = "Seed-hash read aligner for DNA sequences", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align single-end reads
    Single {
        /// <index-dir> <input file(s)> [<options>]
        #[arg(
            value_name = "INDEX-DIR <INPUT...> [OPTIONS]",
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true
        )]
        tokens: Vec<String>,
    },

    /// Align paired-end reads
    Paired {
        /// <index-dir> <input file(s)> [<options>]
        #[arg(
            value_name = "INDEX-DIR <INPUT...> [OPTIONS]",
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true
        )]
        tokens: Vec<String>,
    },
}

fn init_logger(verbosity: u8) {
    let log_level = match verbosity {
        0 | 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let (paired, tokens) = match cli.command {
        Commands::Single { tokens } => (false, tokens),
        Commands::Paired { tokens } => (true, tokens),
    };

    // The resolver sees the full token stream including the mode keyword.
    let mode = if paired { "paired" } else { "single" };
    let mut resolver_tokens = Vec::with_capacity(tokens.len() + 1);
    resolver_tokens.push(mode.to_string());
    resolver_tokens.extend(tokens);

    let recognizer = ExtensionRecognizer::new(paired);
    let (mut options, _tokens_consumed) =
        match cmdline::resolve(&resolver_tokens, &recognizer, &DefaultOptionParser) {
            Ok(resolved) => resolved,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("{}", run_opt::usage(paired));
                std::process::exit(1);
            }
        };

    init_logger(options.verbosity);

    let extension: Box<dyn AlignerExtension> = Box::new(NoopExtension);
    extension.extra_options(&mut options);

    let mut cache = IndexCache::new(Box::new(DirectoryIndexProvider));
    let mut context = AlignerContext::new(
        options,
        std::env::args().collect(),
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::new(PassthroughEngine),
        FormatRegistry::with_defaults(),
        extension,
    );

    if let Err(e) = context.run(&mut cache) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
