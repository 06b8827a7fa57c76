//! Interrupt handling for interactive runs.
//!
//! Ctrl+C (or SIGTERM) never kills a backup mid-file. It is turned into a
//! cooperative cancel, so the worker stops at the next filesystem entry and
//! still reports a `Cancelled` completion.

use crate::executor::BackupJob;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fans a single interrupt out to any number of listeners
pub struct InterruptHandler {
    interrupt_tx: broadcast::Sender<()>,
}

impl InterruptHandler {
    pub fn new() -> Self {
        let (interrupt_tx, _) = broadcast::channel(1);
        Self { interrupt_tx }
    }

    /// Get an interrupt receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.interrupt_tx.subscribe()
    }

    /// Notify listeners as if a signal had arrived.
    pub fn trigger(&self) {
        // No receivers is fine: nothing to interrupt.
        let _ = self.interrupt_tx.send(());
    }

    /// Wait for SIGINT or SIGTERM, then notify listeners.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received SIGINT (Ctrl+C)");
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C");
        }

        self.trigger();
        Ok(())
    }
}

impl Default for InterruptHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `job` when the process is interrupted.
///
/// Abort the returned task once the run has finished.
pub fn cancel_on_interrupt(job: BackupJob) -> JoinHandle<()> {
    tokio::spawn(async move {
        let handler = InterruptHandler::new();
        let mut rx = handler.subscribe();

        if let Err(e) = handler.wait_for_signal().await {
            warn!(error = %e, "Cannot listen for interrupts");
            return;
        }

        if rx.recv().await.is_ok() && job.cancel() {
            info!("Cancelling backup, waiting for the current file to finish");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers() {
        let handler = InterruptHandler::new();
        let mut first = handler.subscribe();
        let mut second = handler.subscribe();

        let waiter = tokio::spawn(async move {
            first.recv().await.is_ok()
        });

        handler.trigger();

        assert!(waiter.await.unwrap());
        assert!(second.recv().await.is_ok());
    }

    #[test]
    fn test_trigger_without_subscribers() {
        InterruptHandler::new().trigger();
    }
}
