use crate::prelude::*;

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Debug, Clone)]
pub enum ChannelData {
    Snapshot { device: String, snapshot: Box<Snapshot> },
    Tasks { device: String, tasks: Vec<TaskRecord> },
    PollFailed { device: String, error: String },
    Shutdown,
}
pub type Sender = broadcast::Sender<ChannelData>;
pub type Receiver = broadcast::Receiver<ChannelData>;

/// One SBMS0 reached over HTTP.
#[derive(Clone)]
pub struct Device {
    config: config::Device,
    client: reqwest::Client,
    raw_data_url: Url,
    debug_url: Url,
    channels: Channels,
    shared_stats: Arc<Mutex<PollStats>>,
}

impl Device {
    pub fn new(
        device: &config::Device,
        channels: Channels,
        shared_stats: Arc<Mutex<PollStats>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(device.read_timeout())
            .build()?;

        Ok(Self {
            config: device.clone(),
            client,
            raw_data_url: device.raw_data_url()?,
            debug_url: device.debug_url()?,
            channels,
            shared_stats,
        })
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &config::Device {
        &self.config
    }

    pub fn raw_data_url(&self) -> &Url {
        &self.raw_data_url
    }

    pub fn debug_url(&self) -> &Url {
        &self.debug_url
    }

    /// Poll on the configured interval until a `Shutdown` arrives on
    /// `shutdown_rx`, a subscription to `to_device` taken before the poller
    /// is spawned. Failed polls are reported and the loop carries on.
    pub async fn start(&self, shutdown_rx: &mut Receiver) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "device {}: polling {} every {}s",
            self.name(),
            self.raw_data_url,
            self.config.poll_interval().as_secs()
        );

        loop {
            tokio::select! {
                biased;

                msg = shutdown_rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                            info!("device {}: stopping", self.name());
                            break;
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("device {}: missed {} control messages", self.name(), n);
                        }
                    }
                }

                _ = interval.tick() => self.poll().await,
            }
        }

        Ok(())
    }

    async fn poll(&self) {
        let data = match self.poll_once().await {
            Ok(snapshot) => ChannelData::Snapshot {
                device: self.name().to_owned(),
                snapshot: Box::new(snapshot),
            },
            Err(err) => {
                warn!("device {}: {:#}", self.name(), err);
                ChannelData::PollFailed {
                    device: self.name().to_owned(),
                    error: err.to_string(),
                }
            }
        };
        self.send(data);

        if self.config.tasks() {
            match self.poll_tasks().await {
                Ok(tasks) => self.send(ChannelData::Tasks {
                    device: self.name().to_owned(),
                    tasks,
                }),
                Err(err) => warn!("device {}: task report: {:#}", self.name(), err),
            }
        }
    }

    fn send(&self, data: ChannelData) {
        if self.channels.from_device.send(data).is_err() {
            debug!("device {}: nobody listening on from_device", self.name());
        }
    }

    /// Fetch and decode `/rawData` once.
    pub async fn poll_once(&self) -> Result<Snapshot> {
        let body = self.fetch(&self.raw_data_url).await?;

        match Snapshot::decode(&body) {
            Ok(snapshot) => {
                self.count(|stats| stats.snapshots_decoded += 1);
                debug!(
                    "device {}: {} soc={}% {}mV {}mA",
                    self.name(),
                    snapshot.timestamp,
                    snapshot.soc,
                    snapshot.battery_voltage_mv,
                    snapshot.battery_current_ma
                );
                Ok(snapshot)
            }
            Err(err) => {
                self.count(|stats| stats.decode_failures += 1);
                Err(anyhow!("decoding {}: {}", self.raw_data_url, err))
            }
        }
    }

    /// Fetch and decode the `/debug` task list once.
    pub async fn poll_tasks(&self) -> Result<Vec<TaskRecord>> {
        let body = self.fetch(&self.debug_url).await?;
        let tasks = sbms::tasks::decode(&body);
        self.count(|stats| stats.task_reports_decoded += 1);
        debug!("device {}: {} tasks", self.name(), tasks.len());
        Ok(tasks)
    }

    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        self.count(|stats| stats.requests += 1);

        let result = async {
            let response = self.client.get(url.clone()).send().await?.error_for_status()?;
            Ok::<Bytes, reqwest::Error>(response.bytes().await?)
        }
        .await;

        match result {
            Ok(body) => {
                self.count(|stats| stats.bytes_received += body.len() as u64);
                trace!("device {}: GET {} -> {} bytes", self.name(), url, body.len());
                Ok(body)
            }
            Err(err) => {
                self.count(|stats| stats.fetch_failures += 1);
                Err(anyhow!("GET {}: {}", url, err))
            }
        }
    }

    fn count(&self, f: impl FnOnce(&mut PollStats)) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            f(&mut stats);
        }
    }
}
