use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use tinymod4::output::hid_encoder::{KEY_BACKSPACE, KEY_FALLBACK, RELEASE_REPORT};
use tinymod4::output::{
    output_worker_loop, HidDevice, HidExtension, HookName, HookRegistry, HostHooks, OutputAction,
    OutputError, OutputQueue, WorkerSettings,
};
use tinymod4::config::OutputConfig;

const TIMEOUT_MS: u64 = 500;

struct Worker {
    queue: OutputQueue,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

fn spawn_worker(path: &Path) -> Worker {
    let (queue, receiver) = OutputQueue::channel();
    let (stop, stop_receiver) = watch::channel(false);
    let settings = WorkerSettings {
        open_attempts: 2,
        open_retry_delay: Duration::from_millis(1),
    };
    let device = Arc::new(HidDevice::new(path));
    let handle = tokio::spawn(output_worker_loop(receiver, stop_receiver, device, settings));
    Worker {
        queue,
        stop,
        handle,
    }
}

async fn stop_worker(worker: Worker) {
    worker.stop.send(true).unwrap();
    timeout(Duration::from_millis(TIMEOUT_MS), worker.handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

async fn read_reports(path: &Path, expected: usize) -> Vec<Vec<u8>> {
    let wanted = expected * 8;
    timeout(Duration::from_millis(TIMEOUT_MS), async {
        loop {
            let bytes = std::fs::read(path).expect("read device file");
            if bytes.len() >= wanted {
                return bytes.chunks(8).map(<[u8]>::to_vec).collect();
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("device writes timed out")
}

fn key(modifiers: u8, keycode: u8) -> Vec<u8> {
    vec![modifiers, 0, keycode, 0, 0, 0, 0, 0]
}

#[tokio::test]
async fn text_writes_press_and_release_per_character() {
    let device = tempfile::NamedTempFile::new().expect("create device file");
    let worker = spawn_worker(device.path());

    worker.queue.enqueue(OutputAction::Text("ab".into())).unwrap();

    let reports = read_reports(device.path(), 4).await;
    assert_eq!(
        reports,
        vec![key(0, 4), RELEASE_REPORT.to_vec(), key(0, 5), RELEASE_REPORT.to_vec()]
    );

    stop_worker(worker).await;
}

#[tokio::test]
async fn backspaces_are_repeated() {
    let device = tempfile::NamedTempFile::new().expect("create device file");
    let worker = spawn_worker(device.path());

    worker.queue.enqueue(OutputAction::Backspace(3)).unwrap();

    let reports = read_reports(device.path(), 6).await;
    assert_eq!(reports.len(), 6);
    for pair in reports.chunks(2) {
        assert_eq!(pair[0], key(0, KEY_BACKSPACE));
        assert_eq!(pair[1], RELEASE_REPORT.to_vec());
    }

    stop_worker(worker).await;
}

#[tokio::test]
async fn batched_actions_are_written_in_queue_order() {
    let device = tempfile::NamedTempFile::new().expect("create device file");
    let worker = spawn_worker(device.path());

    // Queued before the worker gets to run, so they form one batch
    worker.queue.enqueue(OutputAction::Text("A".into())).unwrap();
    worker.queue.enqueue(OutputAction::Backspace(1)).unwrap();
    worker.queue.enqueue(OutputAction::KeyCombo("ctrl_l(c)".into())).unwrap();
    worker.queue.enqueue(OutputAction::Text("é".into())).unwrap();

    let reports = read_reports(device.path(), 6).await;
    assert_eq!(
        reports,
        vec![
            key(0x02, 4),
            RELEASE_REPORT.to_vec(),
            key(0, KEY_BACKSPACE),
            RELEASE_REPORT.to_vec(),
            key(0, KEY_FALLBACK),
            RELEASE_REPORT.to_vec(),
        ]
    );

    stop_worker(worker).await;
}

#[tokio::test]
async fn key_combos_alone_leave_device_untouched() {
    let device = tempfile::NamedTempFile::new().expect("create device file");
    let worker = spawn_worker(device.path());

    worker.queue.enqueue(OutputAction::KeyCombo("alt_l(tab)".into())).unwrap();
    sleep(Duration::from_millis(50)).await;

    assert!(std::fs::read(device.path()).unwrap().is_empty());
    stop_worker(worker).await;
}

#[tokio::test]
async fn stopped_worker_writes_nothing_more() {
    let device = tempfile::NamedTempFile::new().expect("create device file");
    let worker = spawn_worker(device.path());
    let queue = worker.queue.clone();

    stop_worker(worker).await;

    assert!(matches!(
        queue.enqueue(OutputAction::Text("late".into())),
        Err(OutputError::QueueClosed)
    ));
    sleep(Duration::from_millis(20)).await;
    assert!(std::fs::read(device.path()).unwrap().is_empty());
}

#[tokio::test]
async fn missing_device_drops_batch_and_keeps_running() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let missing = dir.path().join("hidg0");
    let worker = spawn_worker(&missing);

    worker.queue.enqueue(OutputAction::Text("lost".into())).unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(!worker.handle.is_finished());

    // Gadget shows up later
    std::fs::write(&missing, b"").unwrap();
    worker.queue.enqueue(OutputAction::Text("a".into())).unwrap();

    let reports = read_reports(&missing, 2).await;
    assert_eq!(reports, vec![key(0, 4), RELEASE_REPORT.to_vec()]);

    stop_worker(worker).await;
}

#[tokio::test]
async fn extension_routes_hooks_to_device() {
    let device = tempfile::NamedTempFile::new().expect("create device file");
    let hooks = Arc::new(HostHooks::new());
    let registry: Arc<dyn HookRegistry> = hooks.clone();
    let config = OutputConfig {
        device_path: device.path().to_path_buf(),
        open_attempts: 1,
        open_retry_ms: 0,
    };

    let mut extension = HidExtension::start(&config, registry);
    hooks.send_string("z");
    hooks.send_backspaces(1);

    let reports = read_reports(device.path(), 4).await;
    assert_eq!(
        reports,
        vec![
            key(0, 29),
            RELEASE_REPORT.to_vec(),
            key(0, KEY_BACKSPACE),
            RELEASE_REPORT.to_vec(),
        ]
    );

    extension.stop().await.unwrap();
    assert!(!hooks.is_connected(HookName::SendString));

    hooks.send_string("ignored");
    sleep(Duration::from_millis(20)).await;
    assert_eq!(std::fs::read(device.path()).unwrap().len(), 32);
}
