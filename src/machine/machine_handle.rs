//! Machine Handle - lifecycle of the scan thread
//!
//! Owns the thread that connects to the board, scans chords and emits
//! strokes. Hardware that fails to come up (or goes away later) is retried on
//! a fixed interval until it works or capture is stopped; the host never sees
//! a panic, only the [`MachineState`] published on a watch channel.

use crate::config::ScannerConfig;
use crate::machine::board::{BoardConnector, ScanError};
use crate::machine::key_scanner::{KeyScanner, ScanSettings, Scanning};
use crate::machine::stroke_emitter::StrokeEmitter;
use crate::machine::MachineError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Connection state as shown to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MachineState {
    #[default]
    Stopped,
    Initializing,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Stopped => write!(f, "stopped"),
            MachineState::Initializing => write!(f, "initializing"),
            MachineState::Connected => write!(f, "connected"),
            MachineState::Disconnected => write!(f, "disconnected"),
            MachineState::Error => write!(f, "error"),
        }
    }
}

/// Handle for a running capture.
///
/// Dropping the handle raises the stop flag but does not wait for the thread;
/// call [`MachineHandle::stop_capture`] for an orderly shutdown.
pub struct MachineHandle {
    state_receiver: watch::Receiver<MachineState>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MachineHandle {
    /// Spawns the scan thread and starts connecting to the board
    pub fn start_capture(
        connector: Box<dyn BoardConnector>,
        emitter: StrokeEmitter,
        config: &ScannerConfig,
    ) -> Result<Self, MachineError> {
        info!("Starting TinyMod4 capture with settings: {:?}", config);

        let (state_sender, state_receiver) = watch::channel(MachineState::Initializing);
        let stop = Arc::new(AtomicBool::new(false));

        let mut capture = Capture {
            connector,
            emitter,
            settings: ScanSettings::from(config),
            reconnect_interval: config.reconnect_interval(),
            stop: stop.clone(),
            state_sender,
        };

        let thread = thread::Builder::new()
            .name("tinymod4-scan".to_string())
            .spawn(move || capture.run())
            .map_err(|e| MachineError::ThreadError(format!("Failed to spawn scan thread: {}", e)))?;

        Ok(Self {
            state_receiver,
            stop,
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> MachineState {
        *self.state_receiver.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MachineState> {
        debug!("New subscriber to machine state");
        self.state_receiver.clone()
    }

    /// Stops scanning and waits for the scan thread.
    ///
    /// A chord that is being held finishes first.
    pub fn stop_capture(&mut self) -> Result<(), MachineError> {
        info!("Stopping TinyMod4 capture");
        self.stop.store(true, Ordering::Relaxed);

        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| {
                error!("Scan thread panicked");
                MachineError::ThreadError("Scan thread panicked".to_string())
            })?;
        }

        info!("TinyMod4 capture stopped");
        Ok(())
    }
}

impl Drop for MachineHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

// Everything the scan thread owns
struct Capture {
    connector: Box<dyn BoardConnector>,
    emitter: StrokeEmitter,
    settings: ScanSettings,
    reconnect_interval: Duration,
    stop: Arc<AtomicBool>,
    state_sender: watch::Sender<MachineState>,
}

impl Capture {
    fn run(&mut self) {
        info!("Scan thread started");

        while !self.stopped() {
            self.set_state(MachineState::Initializing);

            let mut scanner = match self.connect() {
                Ok(scanner) => scanner,
                Err(e) => {
                    warn!("Error setting up TinyMod4: {}", e);
                    self.set_state(MachineState::Error);
                    self.wait_before_retry();
                    continue;
                }
            };

            self.set_state(MachineState::Connected);

            if let Err(e) = self.scan(&mut scanner) {
                warn!("Lost connection to TinyMod4: {}", e);
                self.set_state(MachineState::Disconnected);
                self.wait_before_retry();
            }
        }

        self.set_state(MachineState::Stopped);
        info!("Scan thread finished");
    }

    fn connect(&mut self) -> Result<KeyScanner<Scanning>, ScanError> {
        let board = self.connector.connect()?;
        KeyScanner::create(board, self.settings.clone(), self.stop.clone()).initialize()
    }

    // Runs until stopped (Ok) or the board fails (Err)
    fn scan(&self, scanner: &mut KeyScanner<Scanning>) -> Result<(), ScanError> {
        while let Some(chord) = scanner.scan_chord()? {
            self.emitter.emit(&chord.keys());
        }
        Ok(())
    }

    fn wait_before_retry(&self) {
        if !self.stopped() {
            thread::sleep(self.reconnect_interval);
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: MachineState) {
        let previous = self.state_sender.send_replace(state);
        if previous != state {
            debug!("Machine state: {} -> {}", previous, state);
        }
    }
}
