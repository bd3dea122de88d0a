//! Steno machine side: switches in, strokes out
//!
//! Implements the input pipeline of the driver:
//!
//! 1. [`board`] - GPIO and port expander access
//! 2. [`key_scanner`] - Press/release envelope and chord accumulation
//! 3. [`chord_decoder`] - Bit fields to steno ordered keys
//! 4. [`stroke_emitter`] - Keymap and hand-off to the host
//! 5. [`machine_handle`] - Scan thread lifecycle and reconnects
//!
//! # Architecture
//!
//! ```text
//! Board ──► KeyScanner ──► ChordDecoder ──► StrokeEmitter ──► StrokeSink
//!           (a, b)         (KeySet)         (Stroke)
//! ```
//!
//! Everything runs on one dedicated thread, the output side never blocks it.

pub mod board;
pub mod chord_decoder;
pub mod key_scanner;
pub mod machine_handle;
pub mod stroke_emitter;

pub use board::{BoardConnector, KeyBoard, RppalConnector, ScanError};
pub use chord_decoder::{decode, KeySet, StenoKey, KEYS_LAYOUT};
pub use key_scanner::{Chord, ChordState, KeyScanner, Sample, ScanSettings};
pub use machine_handle::{MachineHandle, MachineState};
pub use stroke_emitter::{Keymap, Stroke, StrokeEmitter, StrokeMapping, StrokeSink};

// Machine errors
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("Scan error: {0}")]
    ScanError(#[from] ScanError),

    #[error("Unknown key in keymap: {0}")]
    UnknownKey(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}
