use anyhow::Result;
use clap::Parser;
use stagehand::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Diagnostics go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Preview(args) => stagehand::core::render::run(args, &ctx),
        Commands::Validate(args) => stagehand::core::validate::run(args, &ctx),
        Commands::Apply(args) => stagehand::core::apply::run(args, &ctx),
        Commands::Backup(args) => stagehand::core::backup::run(args, &ctx),
        Commands::Init(args) => stagehand::infra::config::init(args, &ctx),
        Commands::Completions(args) => stagehand::completion::run(args),
    }
}
