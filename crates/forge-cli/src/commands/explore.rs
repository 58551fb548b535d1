use super::cancel_on_interrupt;
use crate::cli::ExploreArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use fragforge::engine::cancel::CancellationToken;
use fragforge::engine::error::EngineError;
use fragforge::engine::progress::ProgressReporter;
use fragforge::workflows;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: ExploreArgs, threads: Option<usize>, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging run file and command-line overrides...");
    let config = partial_config.merge_for_exploration(&args, threads)?;
    info!(
        "Exploring up to level {} with {} worker(s) in {:?}",
        config.max_level, config.num_parallel_tasks, &config.work_dir
    );

    let handler = CliProgressHandler::new(ui_sender.clone());
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    let token = CancellationToken::new();
    let interrupt = cancel_on_interrupt(token.clone(), ui_sender.clone());

    let result =
        tokio::task::block_in_place(|| workflows::explore::run_with_token(&config, &reporter, &token));
    interrupt.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(EngineError::Cancelled) => {
            warn!("Exploration stopped before completion.");
            println!(
                "Exploration stopped; rerun with --resume to continue from {}.",
                config.work_dir.display()
            );
            return Err(EngineError::Cancelled.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "Exploration finished after {} level(s): {} graph(s) built, {} candidate(s) recorded, {} with errors.",
        summary.levels_completed, summary.graphs_built, summary.candidates, summary.failed
    );
    match &summary.best {
        Some((name, fitness)) => println!("✓ Best candidate: {} (fitness {:.4})", name, fitness),
        None if config.submits_fitness() => println!("No candidate received a fitness."),
        None => println!("No fitness provider configured; candidates were built only."),
    }
    println!("Results written to {}", config.work_dir.display());
    Ok(())
}
