use super::cancel_on_interrupt;
use crate::cli::EvaluateArgs;
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use fragforge::engine::cancel::CancellationToken;
use fragforge::engine::progress::ProgressReporter;
use fragforge::workflows::{self, evaluate::EvaluationInput};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: EvaluateArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    if !args.input.is_file() {
        return Err(CliError::Argument(format!(
            "input file does not exist: {}",
            args.input.display()
        )));
    }
    let config = PartialRunConfig::from_file(&args.config)?.merge_for_evaluation(&args)?;
    let input = EvaluationInput::from_path(args.input.clone());
    info!("Evaluating {:?}", &input);

    let handler = CliProgressHandler::new(ui_sender.clone());
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    let token = CancellationToken::new();
    let interrupt = cancel_on_interrupt(token.clone(), ui_sender);

    let result = tokio::task::block_in_place(|| {
        workflows::evaluate::run_with_token(&config, &input, &reporter, &token)
    });
    interrupt.abort();
    let candidate = result?;

    match (candidate.fitness(), candidate.error()) {
        (Some(fitness), _) => println!("✓ {} fitness: {:.6}", candidate.name, fitness),
        (None, Some(message)) => println!("{} has no fitness: {}", candidate.name, message),
        (None, None) => println!("{} has no fitness.", candidate.name),
    }
    if !candidate.smiles.is_empty() {
        println!("  SMILES: {}", candidate.smiles);
    }
    if let Some(path) = &candidate.output_file {
        println!("  Output written to {}", path.display());
    }
    Ok(())
}
