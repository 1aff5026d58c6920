use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

use super::controller::SessionController;
use super::stats::{SessionPhase, SessionStats};

enum SessionCommand {
    Toggle(oneshot::Sender<SessionPhase>),
    Stop(oneshot::Sender<SessionPhase>),
    Stats(oneshot::Sender<SessionStats>),
}

/// Cloneable handle to a controller running on its own task
///
/// The task is the session's single event loop: user commands and transport
/// events are handled one at a time, in arrival order.
#[derive(Clone)]
pub struct VoiceSessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    phase: watch::Receiver<SessionPhase>,
}

impl VoiceSessionHandle {
    pub fn spawn(controller: SessionController) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let phase = controller.subscribe();
        let task = tokio::spawn(run(controller, rx));

        (
            Self {
                commands: tx,
                phase,
            },
            task,
        )
    }

    /// Start a session when idle, stop it otherwise. Returns the phase after
    /// the command was applied.
    pub async fn toggle(&self) -> Result<SessionPhase> {
        self.request(SessionCommand::Toggle).await
    }

    pub async fn stop(&self) -> Result<SessionPhase> {
        self.request(SessionCommand::Stop).await
    }

    pub async fn stats(&self) -> Result<SessionStats> {
        self.request(SessionCommand::Stats).await
    }

    /// Latest published phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for(&self, target: SessionPhase) -> Result<()> {
        let mut phase = self.phase.clone();
        phase
            .wait_for(|p| *p == target)
            .await
            .context("Voice session task ended")?;
        Ok(())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .context("Voice session task ended")?;
        rx.await.context("Voice session task dropped the reply")
    }
}

async fn run(mut controller: SessionController, mut commands: mpsc::Receiver<SessionCommand>) {
    info!("Voice session loop started");

    loop {
        let idle = controller.is_idle();

        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Toggle(reply)) => {
                        controller.toggle().await;
                        let _ = reply.send(controller.phase());
                    }
                    Some(SessionCommand::Stop(reply)) => {
                        controller.stop().await;
                        let _ = reply.send(controller.phase());
                    }
                    Some(SessionCommand::Stats(reply)) => {
                        let _ = reply.send(controller.stats());
                    }
                    None => break,
                }
            }
            Some(event) = controller.next_event(), if !idle => {
                controller.handle_event(event).await;
            }
        }
    }

    controller.stop().await;
    info!("Voice session loop stopped");
}
