//! HID gadget output
//!
//! The host hands text, backspaces and key combinations to the three output
//! hooks. They are queued and a single worker task turns them into keyboard
//! reports on the gadget device.
//!
//! # Architecture
//!
//! ```text
//! HookRegistry ──► OutputQueue ──► output worker ──► HidEncoder ──► /dev/hidg0
//!  (3 hooks)        (FIFO)          (batches)         (8 byte reports)
//! ```
//!
//! The worker is the only writer of the device. It opens the device once per
//! batch of queued actions and closes it again before going back to sleep.

pub mod hid_encoder;
pub mod hid_extension;
pub mod hooks;
pub mod output_queue;
pub mod output_worker;

pub use hid_encoder::{HidEncoder, HidReport, Modifiers};
pub use hid_extension::HidExtension;
pub use hooks::{HookName, HookRegistry, HostHooks, OutputHooks};
pub use output_queue::OutputQueue;
pub use output_worker::{output_worker_loop, HidDevice, WorkerSettings};

use std::fmt;

/// One unit of pending output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputAction {
    /// Type a string
    Text(String),

    /// Press backspace this many times
    Backspace(usize),

    /// Key combination in host notation, not sent to the device yet
    KeyCombo(String),
}

impl OutputAction {
    /// Whether the action produces device writes
    pub fn writes_reports(&self) -> bool {
        match self {
            OutputAction::Text(text) => !text.is_empty(),
            OutputAction::Backspace(count) => *count > 0,
            OutputAction::KeyCombo(_) => false,
        }
    }
}

impl fmt::Display for OutputAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputAction::Text(text) => write!(f, "text {:?}", text),
            OutputAction::Backspace(count) => write!(f, "{} backspace(s)", count),
            OutputAction::KeyCombo(combo) => write!(f, "key combo {:?}", combo),
        }
    }
}

// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to open HID device {path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write HID report: {0}")]
    Write(#[from] std::io::Error),

    #[error("Output queue closed")]
    QueueClosed,

    #[error("Worker error: {0}")]
    WorkerError(String),
}
