//! Hand-off of reader-thread callbacks to the pipeline's owning task.
//!
//! Reader threads never touch pipeline or display state. The
//! [`ChannelListener`] turns each callback into a [`ProcessEvent`] on an
//! unbounded channel; the single task that owns the controller drains it.

use crate::process::{AsyncProcess, ProcessListener};
use tokio::sync::mpsc;
use tracing::trace;

/// A listener callback, queued for the owning context.
#[derive(Debug)]
pub enum ProcessEvent {
    Data { process: AsyncProcess, data: Vec<u8> },
    Finished { process: AsyncProcess },
}

impl ProcessEvent {
    pub fn process(&self) -> &AsyncProcess {
        match self {
            Self::Data { process, .. } | Self::Finished { process } => process,
        }
    }
}

/// [`ProcessListener`] that forwards every callback as a [`ProcessEvent`].
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<ProcessEvent>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::UnboundedSender<ProcessEvent>) -> Self {
        Self { sender }
    }

    /// Listener plus the receiving end to drain on the owning task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn forward(&self, event: ProcessEvent) {
        // The receiver is gone once the owning context shut down; late
        // output has nowhere to go.
        if self.sender.send(event).is_err() {
            trace!("dropping process event after receiver closed");
        }
    }
}

impl ProcessListener for ChannelListener {
    fn on_data(&self, process: &AsyncProcess, data: &[u8]) {
        self.forward(ProcessEvent::Data {
            process: process.clone(),
            data: data.to_vec(),
        });
    }

    fn on_finished(&self, process: &AsyncProcess) {
        self.forward(ProcessEvent::Finished {
            process: process.clone(),
        });
    }
}
