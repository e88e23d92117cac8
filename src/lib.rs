pub mod channels;
pub mod config;
pub mod coordinator;
pub mod datalog_writer;
pub mod error;
pub mod mqtt;
pub mod options;
pub mod prelude;
pub mod sbms;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use crate::coordinator::Coordinator;
use crate::datalog_writer::DatalogWriter;
use crate::mqtt::Mqtt;
use crate::sbms::device::Device;

use std::io::Write;
use tokio::task::JoinHandle;

/// Install the process logger: `[time level module] message` on stderr,
/// filtered by `RUST_LOG` if set, else by `level`.
pub fn init_logging(level: &str) {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if let Err(e) = result {
        eprintln!("logger already initialised: {}", e);
    }
}

/// Running application components, stopped in dependency order.
pub struct Components {
    pub coordinator: Coordinator,
    pub mqtt: Mqtt,
    pub channels: Channels,
}

impl Components {
    /// Devices first so nothing new is produced, then the coordinator
    /// drains what is queued, then mqtt.
    pub async fn stop(&self, device_handles: Vec<JoinHandle<()>>, coordinator_handle: JoinHandle<()>) {
        info!("Stopping all components...");

        let _ = self.channels.to_device.send(sbms::device::ChannelData::Shutdown);
        for handle in device_handles {
            if let Err(e) = handle.await {
                error!("Error waiting for device task: {}", e);
            }
        }

        self.coordinator.stop();
        if let Err(e) = coordinator_handle.await {
            error!("Error waiting for coordinator task: {}", e);
        }

        self.mqtt.stop().await;

        info!("Shutdown complete");
    }
}

pub async fn app(mut shutdown_rx: broadcast::Receiver<()>, config: ConfigWrapper) -> Result<()> {
    info!("sbms-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    let datalog_writer = match config.datalog_file() {
        Some(path) => Some(DatalogWriter::new(path)?),
        None => None,
    };

    info!("  Creating Coordinator...");
    let coordinator = Coordinator::new(config.clone(), channels.clone(), datalog_writer);
    // subscribe before any device can send
    let mut device_rx = channels.from_device.subscribe();
    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.device_receiver(&mut device_rx).await {
            error!("Coordinator task failed: {}", e);
        }
    });

    info!("  Creating MQTT client...");
    let mqtt = Mqtt::new(config.clone(), channels.clone(), coordinator.stats.clone());
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("MQTT task failed: {}", e);
        }
    });

    info!("  Creating Device pollers...");
    let devices = config
        .enabled_devices()
        .iter()
        .map(|device| Device::new(device, channels.clone(), coordinator.stats.clone()))
        .collect::<Result<Vec<_>>>()?;

    let device_handles: Vec<_> = devices
        .into_iter()
        .map(|device| {
            // subscribe before spawning so an early shutdown is not missed
            let mut control_rx = channels.to_device.subscribe();
            tokio::spawn(async move {
                if let Err(e) = device.start(&mut control_rx).await {
                    error!("device {}: poller failed: {}", device.name(), e);
                }
            })
        })
        .collect();
    info!("{} devices started", device_handles.len());

    info!("Waiting for shutdown signal...");
    let _ = shutdown_rx.recv().await;
    info!("Shutdown signal received, stopping components...");

    let components = Components {
        coordinator,
        mqtt,
        channels,
    };
    components.stop(device_handles, coordinator_handle).await;

    if let Err(e) = mqtt_handle.await {
        error!("Error waiting for mqtt task: {}", e);
    }

    info!("Application shutdown complete");
    Ok(())
}

/// Poll every enabled device once and print the results as JSON on stdout.
pub async fn poll_once(config: ConfigWrapper) -> Result<()> {
    let channels = Channels::new();
    let stats = std::sync::Arc::new(std::sync::Mutex::new(PollStats::default()));

    let devices = config.enabled_devices();
    let mut failures = 0;

    for device in &devices {
        let device = Device::new(device, channels.clone(), stats.clone())?;

        match device.poll_once().await {
            Ok(snapshot) => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "device": device.name(),
                    "snapshot": snapshot,
                }))?
            ),
            Err(e) => {
                error!("device {}: {:#}", device.name(), e);
                failures += 1;
                continue;
            }
        }

        if device.config().tasks() {
            match device.poll_tasks().await {
                Ok(tasks) => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "device": device.name(),
                        "tasks": tasks,
                    }))?
                ),
                Err(e) => error!("device {}: task report: {:#}", device.name(), e),
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} devices could not be polled", failures, devices.len());
    }

    Ok(())
}
