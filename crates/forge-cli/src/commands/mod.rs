pub mod evaluate;
pub mod explore;

use crate::ui::UiEvent;
use fragforge::engine::cancel::CancellationToken;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Cancels `token` on the first Ctrl-C. The workflow then stops at its next
/// safe point; abort the returned handle once the workflow has returned.
fn cancel_on_interrupt(token: CancellationToken, ui_sender: mpsc::Sender<UiEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received; stopping after the running tasks.");
                ui_sender
                    .send(UiEvent::Log(
                        "⚠ Interrupt received, finishing the running tasks...".to_string(),
                    ))
                    .await
                    .ok();
                token.cancel();
            }
            Err(e) => error!("Unable to listen for the interrupt signal: {}", e),
        }
    })
}
