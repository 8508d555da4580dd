//! Event loop owning a [`PipelineController`].

use super::{BuildContext, BuildOutcome, PipelineController, PipelineError};
use crate::dispatch::{ChannelListener, ProcessEvent};
use crate::process::Command;
use crate::sink::{DisplaySink, StatusSink};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Single consumer of process events: the controller, its sinks and the
/// channel its listener feeds all live here.
pub struct BuildRunner<D, S> {
    controller: PipelineController<D, S>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl<D: DisplaySink, S: StatusSink> BuildRunner<D, S> {
    pub fn new(display: D, status: S) -> Self {
        let (listener, events) = ChannelListener::channel();
        Self {
            controller: PipelineController::new(display, status, Arc::new(listener)),
            events,
        }
    }

    pub fn controller(&self) -> &PipelineController<D, S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PipelineController<D, S> {
        &mut self.controller
    }

    pub fn into_parts(self) -> (D, S) {
        self.controller.into_parts()
    }

    /// Hand one event to the controller.
    pub fn dispatch(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Data { process, data } => self.controller.on_data(&process, &data),
            ProcessEvent::Finished { process } => self.controller.on_finished(&process),
        }
    }

    /// Start a build and drive it to completion. Resolving `cancel` kills
    /// the build.
    pub async fn run<F>(
        &mut self,
        context: BuildContext,
        commands: Vec<Command>,
        cancel: F,
    ) -> Result<Option<BuildOutcome>, PipelineError>
    where
        F: Future<Output = ()>,
    {
        self.controller.begin(context, commands)?;
        Ok(self.drive(cancel).await)
    }

    /// Process events until the current build reaches a terminal state.
    pub async fn drive<F>(&mut self, cancel: F) -> Option<BuildOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut cancel_requested = false;

        while self.controller.is_active() {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                () = &mut cancel, if !cancel_requested => {
                    cancel_requested = true;
                    if !self.controller.kill() {
                        debug!("cancel requested after the last process exited");
                    }
                }
            }
        }

        self.controller.last_outcome().cloned()
    }
}
