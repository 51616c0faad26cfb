//! automaton deploys the Lido L2 token bridge with its governance executor, rehearsing on
//! local forks first and checking the live result afterwards.

mod cli;
mod report;

use anyhow::Result;
use clap::Parser;

use automaton_deploy::{
    ConfigDocument, Context, Env, ForkCleanup, Pipeline, PipelineSettings,
};
use cli::Cli;
use report::{MAIN_LOG, RunReporter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Some(path) = automaton_deploy::env::load_dotenv(cli.env_file.as_deref())? {
        tracing::debug!(path = %path.display(), "Loaded env file");
    }

    let mut settings = PipelineSettings::load(cli.settings.as_deref())?;
    if cli.keep_forks_on_failure {
        settings.fork.cleanup = ForkCleanup::KeepOnFailure;
    }
    let config = ConfigDocument::load(&cli.config)?;

    let phases = cli.selected_phases();
    let pipeline = Pipeline::for_phases(&phases).start_from(cli.start_from)?;
    pipeline.validate()?;

    tracing::info!(
        config_path = %cli.config.display(),
        phases = ?phases,
        steps = pipeline.steps().len(),
        start_from = cli.start_from,
        "Starting deployment pipeline..."
    );

    let mut ctx = Context::new(config, Env::from_process(), settings)?;
    let reporter = RunReporter::create(&ctx.store.path(MAIN_LOG), cli.show_logs)?;

    let summary = pipeline.run(&mut ctx, &reporter).await;
    reporter.finish();
    println!("{}", summary.render_table());

    summary.into_result()
}
