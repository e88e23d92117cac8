use crate::prelude::*;
use crate::datalog_writer::DatalogWriter;
use crate::sbms::device::ChannelData;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{Instant, Interval};

#[derive(Default, Debug, Clone, Serialize)]
pub struct PollStats {
    pub requests: u64,
    pub bytes_received: u64,
    pub snapshots_decoded: u64,
    pub task_reports_decoded: u64,
    pub decode_failures: u64,
    pub fetch_failures: u64,
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
    pub datalog_writes: u64,
    pub datalog_errors: u64,
    // Last failure reported per device
    pub last_errors: HashMap<String, String>,
}

impl PollStats {
    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  HTTP:");
        info!("    Requests: {}", self.requests);
        info!("    Bytes received: {}", self.bytes_received);
        info!("    Fetch failures: {}", self.fetch_failures);
        info!("  Decoding:");
        info!("    Snapshots decoded: {}", self.snapshots_decoded);
        info!("    Task reports decoded: {}", self.task_reports_decoded);
        info!("    Decode failures: {}", self.decode_failures);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
        info!("  Datalog:");
        info!("    Writes: {}", self.datalog_writes);
        info!("    Errors: {}", self.datalog_errors);
        if !self.last_errors.is_empty() {
            info!("  Last errors by device:");
            for (device, error) in &self.last_errors {
                info!("    {}: {}", device, error);
            }
        }
    }
}

/// Fans decoded device data out to the configured sinks.
#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    datalog_writer: Option<DatalogWriter>,
    pub stats: Arc<Mutex<PollStats>>,
}

impl Coordinator {
    pub fn new(config: ConfigWrapper, channels: Channels, datalog_writer: Option<DatalogWriter>) -> Self {
        Self {
            config,
            channels,
            datalog_writer,
            stats: Arc::new(Mutex::new(PollStats::default())),
        }
    }

    pub fn stop(&self) {
        let _ = self.channels.from_device.send(ChannelData::Shutdown);
    }

    /// Process device data until `Shutdown`, publishing stats to MQTT every
    /// `mqtt.stats_interval` meanwhile. The receiver is passed in so the
    /// caller can subscribe before any device starts sending.
    pub async fn device_receiver(&self, receiver: &mut broadcast::Receiver<ChannelData>) -> Result<()> {
        let mut stats_timer = self.stats_timer();

        loop {
            let data = tokio::select! {
                biased;

                msg = receiver.recv() => match msg {
                    Ok(data) => data,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("coordinator lagged, dropped {} device messages", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                _ = tick(&mut stats_timer) => {
                    if let Err(e) = self.publish_stats() {
                        warn!("failed to publish stats: {}", e);
                    }
                    continue;
                }
            };

            match data {
                ChannelData::Snapshot { device, snapshot } => {
                    if let Err(e) = self.process_snapshot(&device, &snapshot) {
                        warn!("device {}: failed to process snapshot: {}", device, e);
                    }
                }
                ChannelData::Tasks { device, tasks } => {
                    if let Err(e) = self.process_tasks(&device, &tasks) {
                        warn!("device {}: failed to process task report: {}", device, e);
                    }
                }
                ChannelData::PollFailed { device, error } => {
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.last_errors.insert(device, error);
                    }
                }
                ChannelData::Shutdown => {
                    info!("Received shutdown signal, printing final statistics:");
                    if let Ok(stats) = self.stats.lock() {
                        stats.print_summary();
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    fn process_snapshot(&self, device: &str, snapshot: &Snapshot) -> Result<()> {
        info!(
            "{}: {} soc {}% {}mV {}mA {:.1}W",
            device,
            snapshot.timestamp,
            snapshot.soc,
            snapshot.battery_voltage_mv,
            snapshot.battery_current_ma,
            snapshot.battery_power_w
        );

        if self.config.mqtt().enabled() {
            for message in mqtt::Message::for_snapshot(device, snapshot)? {
                self.publish_message(message)?;
            }
        }

        if let Some(writer) = &self.datalog_writer {
            match writer.write_snapshot(device, snapshot) {
                Ok(()) => self.count(|stats| stats.datalog_writes += 1),
                Err(e) => {
                    self.count(|stats| stats.datalog_errors += 1);
                    bail!("datalog write failed: {}", e);
                }
            }
        }

        Ok(())
    }

    fn process_tasks(&self, device: &str, tasks: &[TaskRecord]) -> Result<()> {
        debug!("{}: {} tasks", device, tasks.len());

        if self.config.mqtt().enabled() {
            self.publish_message(mqtt::Message::for_tasks(device, tasks)?)?;
        }

        Ok(())
    }

    fn stats_timer(&self) -> Option<Interval> {
        if !self.config.mqtt().enabled() {
            return None;
        }
        let period = self.config.mqtt().stats_interval()?;
        Some(tokio::time::interval_at(Instant::now() + period, period))
    }

    fn publish_stats(&self) -> Result<()> {
        let stats = match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(_) => bail!("stats lock poisoned"),
        };
        self.publish_message(mqtt::Message::for_stats(&stats)?)
    }

    fn publish_message(&self, message: mqtt::Message) -> Result<()> {
        if self.channels.to_mqtt.send(mqtt::ChannelData::Message(message)).is_err() {
            self.count(|stats| stats.mqtt_errors += 1);
            bail!("send(to_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    fn count(&self, f: impl FnOnce(&mut PollStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(yaml: &str) -> ConfigWrapper {
        ConfigWrapper::from_config(Config::from_yaml(yaml).unwrap())
    }

    fn snapshot_data() -> ChannelData {
        ChannelData::Snapshot {
            device: "garage".to_string(),
            snapshot: Box::new(Snapshot {
                soc: 50,
                ..Snapshot::default()
            }),
        }
    }

    #[tokio::test]
    async fn snapshot_fans_out_to_mqtt() {
        let channels = Channels::new();
        let coordinator = Coordinator::new(
            config("devices: []\nmqtt:\n  host: localhost\n"),
            channels.clone(),
            None,
        );

        let mut device_rx = channels.from_device.subscribe();
        let mut mqtt_rx = channels.to_mqtt.subscribe();

        channels.from_device.send(snapshot_data()).unwrap();
        channels.from_device.send(ChannelData::Shutdown).unwrap();
        coordinator.device_receiver(&mut device_rx).await.unwrap();

        let mut topics = Vec::new();
        while let Ok(mqtt::ChannelData::Message(m)) = mqtt_rx.try_recv() {
            topics.push(m.topic);
        }
        assert_eq!(topics.len(), 10);
        assert_eq!(topics[0], "garage/snapshot");
    }

    #[tokio::test]
    async fn poll_failures_are_remembered() {
        let channels = Channels::new();
        let coordinator = Coordinator::new(config("devices: []\n"), channels.clone(), None);
        let mut device_rx = channels.from_device.subscribe();

        channels
            .from_device
            .send(ChannelData::PollFailed {
                device: "garage".to_string(),
                error: "connection refused".to_string(),
            })
            .unwrap();
        channels.from_device.send(ChannelData::Shutdown).unwrap();
        coordinator.device_receiver(&mut device_rx).await.unwrap();

        let stats = coordinator.stats.lock().unwrap();
        assert_eq!(stats.last_errors["garage"], "connection refused");
        assert_eq!(stats.mqtt_errors, 0);
    }

    #[tokio::test]
    async fn snapshot_is_written_to_datalog() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let writer = DatalogWriter::new(file.path().to_str().unwrap()).unwrap();

        let channels = Channels::new();
        let coordinator = Coordinator::new(config("devices: []\n"), channels.clone(), Some(writer));
        let mut device_rx = channels.from_device.subscribe();

        channels.from_device.send(snapshot_data()).unwrap();
        channels.from_device.send(ChannelData::Shutdown).unwrap();
        coordinator.device_receiver(&mut device_rx).await.unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert_eq!(coordinator.stats.lock().unwrap().datalog_writes, 1);
    }

    #[tokio::test]
    async fn stats_are_published_periodically() {
        let channels = Channels::new();
        let coordinator = Coordinator::new(
            config("devices: []\nmqtt:\n  host: localhost\n  stats_interval: 1\n"),
            channels.clone(),
            None,
        );
        coordinator.count(|stats| stats.requests = 7);

        let mut device_rx = channels.from_device.subscribe();
        let mut mqtt_rx = channels.to_mqtt.subscribe();

        let c = coordinator.clone();
        let handle = tokio::spawn(async move { c.device_receiver(&mut device_rx).await });

        let message = match tokio::time::timeout(Duration::from_secs(5), mqtt_rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            mqtt::ChannelData::Message(m) => m,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(message.topic, "stats");
        let value: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(value["requests"], 7);

        channels.from_device.send(ChannelData::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn no_stats_without_mqtt() {
        let channels = Channels::new();
        let coordinator = Coordinator::new(config("devices: []\n"), channels.clone(), None);
        assert!(coordinator.stats_timer().is_none());

        let coordinator = Coordinator::new(
            config("devices: []\nmqtt:\n  host: localhost\n  stats_interval: 0\n"),
            channels,
            None,
        );
        assert!(coordinator.stats_timer().is_none());
    }
}
