use crate::config::OutputConfig;
use crate::output::hid_encoder::HidEncoder;
use crate::output::{OutputAction, OutputError};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

// Worker settings
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub open_attempts: u32,
    pub open_retry_delay: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            open_attempts: 3,
            open_retry_delay: Duration::from_millis(100),
        }
    }
}

impl From<&OutputConfig> for WorkerSettings {
    fn from(config: &OutputConfig) -> Self {
        Self {
            open_attempts: config.open_attempts.max(1),
            open_retry_delay: config.open_retry_delay(),
        }
    }
}

/// The HID gadget character device
#[derive(Debug, Clone)]
pub struct HidDevice {
    path: PathBuf,
}

impl HidDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the device for writing, retrying while the gadget is not ready
    pub fn open(&self, settings: &WorkerSettings) -> Result<File, OutputError> {
        let mut attempt = 1;
        loop {
            // Append keeps earlier batches when the target is a plain file
            match OpenOptions::new().append(true).open(&self.path) {
                Ok(file) => return Ok(file),
                Err(e) if attempt < settings.open_attempts => {
                    warn!(
                        "Failed to open {}: {} (attempt {}/{})",
                        self.path.display(),
                        e,
                        attempt,
                        settings.open_attempts
                    );
                    attempt += 1;
                    std::thread::sleep(settings.open_retry_delay);
                }
                Err(e) => {
                    return Err(OutputError::DeviceOpen {
                        path: self.path.display().to_string(),
                        source: e,
                    })
                }
            }
        }
    }

    /// Writes a batch of actions through one open handle.
    ///
    /// A write error ends the batch: the reports already sent cannot be taken
    /// back, so sending the batch again would type it twice.
    pub fn write_batch(
        &self,
        batch: &[OutputAction],
        settings: &WorkerSettings,
    ) -> Result<usize, OutputError> {
        let mut file = self.open(settings)?;
        let mut presses = 0;
        for action in batch {
            presses += HidEncoder::write_action(&mut file, action)?;
        }
        file.flush()?;
        Ok(presses)
    }
}

/// Drains the output queue until stopped or every sender is gone.
///
/// Sleeps on the channel while it is empty. Each wake-up takes everything
/// queued so far as one batch.
pub async fn output_worker_loop(
    mut receiver: mpsc::UnboundedReceiver<OutputAction>,
    mut stop: watch::Receiver<bool>,
    device: Arc<HidDevice>,
    settings: WorkerSettings,
) {
    info!("Output worker started for {}", device.path().display());

    loop {
        let first = tokio::select! {
            biased;

            _ = stop.wait_for(|stopped| *stopped) => {
                info!("Output worker received stop signal");
                break;
            }

            action = receiver.recv() => match action {
                Some(action) => action,
                None => {
                    info!("Output queue closed");
                    break;
                }
            },
        };

        let mut batch = vec![first];
        while let Ok(action) = receiver.try_recv() {
            batch.push(action);
        }
        debug!("Processing batch of {} output action(s)", batch.len());

        process_batch(&device, batch, &settings).await;
    }

    info!("Output worker finished");
}

async fn process_batch(device: &Arc<HidDevice>, batch: Vec<OutputAction>, settings: &WorkerSettings) {
    if !batch.iter().any(OutputAction::writes_reports) {
        // Nothing for the device, only log the key combos
        for action in &batch {
            if let OutputAction::KeyCombo(combo) = action {
                info!("send_key_combination: {}", combo);
            }
        }
        return;
    }

    let count = batch.len();
    let device = Arc::clone(device);
    let settings = settings.clone();
    let result = tokio::task::spawn_blocking(move || device.write_batch(&batch, &settings)).await;

    match result {
        Ok(Ok(presses)) => debug!("Sent {} key press(es) for {} action(s)", presses, count),
        Ok(Err(e)) => error!("Dropping {} output action(s): {}", count, e),
        Err(e) => error!("HID writer task failed: {}", e),
    }
}
