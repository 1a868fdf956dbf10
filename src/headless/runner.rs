//! Headless mode runner - drive the engine until Ctrl+C or `quit`

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ohap_app::{Engine, EngineCommand, Settings};
use ohap_core::prelude::Result;

use super::{HeadlessEvent, HeadlessObserver};

/// Connect to the configured central unit and print events until shutdown
pub async fn run_headless(settings: Settings) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("OHAP client starting in HEADLESS mode");
    info!("Central unit: {}", settings.server.url);
    info!("═══════════════════════════════════════════════════════");

    let mut engine = Engine::new(settings)?;

    let cmd_tx = engine.command_sender();
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(cmd_tx);
    });

    engine.start(HeadlessObserver).await?;

    engine
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    HeadlessEvent::tree(&engine.central_unit().render_tree()).emit();
    info!("OHAP client headless mode exiting");
    Ok(())
}

/// Read commands from stdin and queue them on the engine (blocking version)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<EngineCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match trimmed.parse::<EngineCommand>() {
                    Ok(command) => {
                        let quit = command == EngineCommand::Quit;
                        info!("Stdin: {:?}", command);
                        if cmd_tx.blocking_send(command).is_err() || quit {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Unknown stdin command: {}", trimmed);
                        HeadlessEvent::error(e.to_string(), false).emit();
                    }
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
