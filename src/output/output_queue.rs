use crate::output::hooks::OutputHooks;
use crate::output::{OutputAction, OutputError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Producer side of the output queue.
///
/// Actions are delivered in the order they were queued. Queueing never
/// blocks; it wakes the worker if it is waiting.
#[derive(Clone, Debug)]
pub struct OutputQueue {
    sender: mpsc::UnboundedSender<OutputAction>,
}

impl OutputQueue {
    /// Creates the queue and the receiver the worker drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputAction>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, action: OutputAction) -> Result<(), OutputError> {
        debug!("Queueing {}", action);
        self.sender
            .send(action)
            .map_err(|_| OutputError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn push(&self, action: OutputAction) {
        if let Err(e) = self.enqueue(action) {
            warn!("Dropping output: {}", e);
        }
    }
}

impl OutputHooks for OutputQueue {
    fn send_string(&self, text: &str) {
        self.push(OutputAction::Text(text.to_string()));
    }

    fn send_backspaces(&self, count: usize) {
        self.push(OutputAction::Backspace(count));
    }

    fn send_key_combination(&self, combo: &str) {
        self.push(OutputAction::KeyCombo(combo.to_string()));
    }
}
