use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tinymod4::config::{config_path, DriverConfig};
use tinymod4::machine::{Keymap, MachineHandle, RppalConnector, Stroke, StrokeEmitter};
use tinymod4::output::{HidExtension, HookRegistry, HostHooks};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await?;

    // Output side
    let hooks = Arc::new(HostHooks::new());
    let registry: Arc<dyn HookRegistry> = hooks.clone();
    let mut extension = HidExtension::start(&config.output, registry);

    // Machine side
    let (stroke_sender, stroke_receiver) = mpsc::channel::<Stroke>(100);
    let keymap = Keymap::from_config(&config.keymap)
        .map_err(|e| eyre!("Invalid keymap: {}", e))?;
    let emitter = StrokeEmitter::new(Box::new(keymap), Box::new(stroke_sender));
    let connector = Box::new(RppalConnector::new(config.scanner.clone()));

    let mut machine = MachineHandle::start_capture(connector, emitter, &config.scanner)
        .map_err(|e| eyre!("Failed to start capture: {}", e))?;

    let _stroke_log = tokio::spawn(log_strokes(stroke_receiver));

    let mut state_receiver = machine.subscribe();
    let _state_log = tokio::spawn(async move {
        while state_receiver.changed().await.is_ok() {
            let state = *state_receiver.borrow_and_update();
            info!("Machine state: {}", state);
        }
    });

    let stdin_hooks = hooks.clone();
    let _stdin_forward = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("stdin: {:?}", line);
                    stdin_hooks.send_string(&format!("{}\n", line));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for ctrl-c: {}", e))?;
    info!("Shutting down");

    tokio::task::spawn_blocking(move || machine.stop_capture())
        .await
        .map_err(|e| eyre!("Failed to join capture shutdown: {}", e))?
        .map_err(|e| eyre!("Failed to stop capture: {}", e))?;

    extension
        .stop()
        .await
        .map_err(|e| eyre!("Failed to stop HID extension: {}", e))?;

    Ok(())
}

async fn log_strokes(mut receiver: mpsc::Receiver<Stroke>) {
    while let Some(stroke) = receiver.recv().await {
        info!(
            "Stroke at {}: {}",
            stroke.timestamp.format("%H:%M:%S%.3f"),
            stroke.actions.join(" ")
        );
    }
}

async fn load_config() -> Result<DriverConfig> {
    let path = config_path();
    DriverConfig::ensure_default_config(&path).await?;
    let config = DriverConfig::load(&path).await?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
