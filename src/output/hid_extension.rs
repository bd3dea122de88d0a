use crate::config::OutputConfig;
use crate::output::hooks::{HookName, HookRegistry, OutputHooks};
use crate::output::output_queue::OutputQueue;
use crate::output::output_worker::{output_worker_loop, HidDevice, WorkerSettings};
use crate::output::OutputError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Output side of the driver: the hook handlers plus the worker feeding the
/// HID gadget.
pub struct HidExtension {
    queue: OutputQueue,
    registry: Arc<dyn HookRegistry>,
    stop_sender: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl HidExtension {
    /// Spawns the output worker and connects the three output hooks.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(config: &OutputConfig, registry: Arc<dyn HookRegistry>) -> Self {
        let (queue, receiver) = OutputQueue::channel();
        let (stop_sender, stop_receiver) = watch::channel(false);
        let device = Arc::new(HidDevice::new(config.device_path.clone()));
        let settings = WorkerSettings::from(config);

        let worker = tokio::spawn(output_worker_loop(receiver, stop_receiver, device, settings));

        let handler: Arc<dyn OutputHooks> = Arc::new(queue.clone());
        for hook in HookName::ALL {
            registry.hook_connect(hook, Arc::clone(&handler));
        }
        info!("HID extension started on {}", config.device_path.display());

        Self {
            queue,
            registry,
            stop_sender,
            worker: Some(worker),
        }
    }

    /// Direct access to the queue, bypassing the hook registry
    pub fn queue(&self) -> &OutputQueue {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Disconnects the hooks, wakes the worker and waits for it to finish.
    ///
    /// A batch already being written is completed first.
    pub async fn stop(&mut self) -> Result<(), OutputError> {
        for hook in HookName::ALL {
            self.registry.hook_disconnect(hook);
        }
        let _ = self.stop_sender.send(true);

        if let Some(worker) = self.worker.take() {
            worker.await.map_err(|e| {
                error!("Output worker ended abnormally: {}", e);
                OutputError::WorkerError(e.to_string())
            })?;
        }
        info!("HID extension stopped");
        Ok(())
    }
}

impl Drop for HidExtension {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop_sender.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::hooks::HostHooks;
    use std::time::Duration;

    fn config_for(path: &std::path::Path) -> OutputConfig {
        OutputConfig {
            device_path: path.to_path_buf(),
            open_attempts: 1,
            open_retry_ms: 0,
        }
    }

    #[tokio::test]
    async fn start_connects_and_stop_disconnects_hooks() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let hooks = Arc::new(HostHooks::new());

        let mut extension = HidExtension::start(&config_for(device.path()), hooks.clone());
        for hook in HookName::ALL {
            assert!(hooks.is_connected(hook));
        }
        assert!(extension.is_running());

        tokio::time::timeout(Duration::from_secs(2), extension.stop())
            .await
            .expect("worker did not stop")
            .unwrap();

        for hook in HookName::ALL {
            assert!(!hooks.is_connected(hook));
        }
        assert!(!extension.is_running());
        assert!(extension.queue().is_closed());
    }

    #[tokio::test]
    async fn stopping_twice_is_harmless() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let hooks = Arc::new(HostHooks::new());

        let mut extension = HidExtension::start(&config_for(device.path()), hooks);
        extension.stop().await.unwrap();
        extension.stop().await.unwrap();
    }
}
