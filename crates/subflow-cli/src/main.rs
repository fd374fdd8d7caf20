mod cli;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, RunArgs};

use subflow::{
    load_config, logging, Collaborators, Config, ConcurrencyMode, JobSpec, Outcome,
    PipelineCoordinator, ProgressEvent,
};

const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;
const PROGRESS_POLL: Duration = Duration::from_millis(200);

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let directives = if cli.verbose { "subflow=debug,info" } else { "info" };
    logging::init(directives, None).context("Failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Run(args) => run_job(config, args),
        Commands::Config { print } => {
            if print {
                print_config(&config)?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_job(config: Config, args: RunArgs) -> Result<ExitCode> {
    let mut spec = JobSpec {
        url: args.url,
        file: args.file,
        target_language: args.lang,
        service: args.service,
        ..JobSpec::default()
    };
    if args.gpu {
        spec = spec.gpu(true);
    }
    if args.sequential {
        spec = spec.concurrency(ConcurrencyMode::Sequential);
    } else if let Some(workers) = args.workers {
        spec = spec.concurrency(ConcurrencyMode::BoundedParallel(workers));
    }

    let collaborators = Collaborators::from_config(&config)?;
    let coordinator = PipelineCoordinator::new(config, collaborators);
    let handle = coordinator.submit(spec)?;
    tracing::info!(job_id = %handle.job_id(), "job submitted");

    let commands = coordinator.commands().clone();
    let job_id = handle.job_id().to_string();
    ctrlc::set_handler(move || {
        if commands.request_cancel(&job_id) {
            eprintln!("Cancelling, waiting for the current step to finish...");
        }
    })
    .context("Failed to install Ctrl-C handler")?;

    let progress = handle.progress();
    while !handle.is_finished() {
        if let Ok(event) = progress.recv_timeout(PROGRESS_POLL) {
            print_progress(&event);
        }
    }
    for event in progress.try_iter() {
        print_progress(&event);
    }

    let outcome = handle.wait();
    println!("{}", outcome);

    Ok(match outcome {
        Outcome::Succeeded(_) => ExitCode::SUCCESS,
        Outcome::Failed(_) => ExitCode::from(EXIT_FAILED),
        Outcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
    })
}

fn print_progress(event: &ProgressEvent) {
    println!("[{:>3}%] {}", event.percent, event.message);
}

/// Inline keys are masked; file and env var references are shown as is.
fn print_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    for source in [&mut shown.deepl, &mut shown.openai] {
        if source.key.is_some() {
            source.key = Some("****".to_string());
        }
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
