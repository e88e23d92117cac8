use crate::prelude::*;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PUBLISH_ATTEMPTS: u32 = 3;
const RETRY_DELAY_SECS: u64 = 10;
const RECONNECT_DELAY_SECS: u64 = 5;

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    /// The whole snapshot, then each cell and the cracked flags on their own
    /// topics. Topics are relative to the namespace.
    pub fn for_snapshot(device: &str, snapshot: &Snapshot) -> Result<Vec<Message>> {
        let mut r = vec![Message {
            topic: format!("{}/snapshot", device),
            retain: false,
            payload: serde_json::to_string(snapshot)?,
        }];

        for (i, cell) in snapshot.cells.iter().enumerate() {
            r.push(Message {
                topic: format!("{}/cells/{}", device, i + 1),
                retain: false,
                payload: serde_json::to_string(cell)?,
            });
        }

        r.push(Message {
            topic: format!("{}/flags", device),
            retain: true,
            payload: serde_json::to_string(&snapshot.flags)?,
        });

        Ok(r)
    }

    pub fn for_tasks(device: &str, tasks: &[TaskRecord]) -> Result<Message> {
        Ok(Message {
            topic: format!("{}/tasks", device),
            retain: false,
            payload: serde_json::to_string(tasks)?,
        })
    }

    /// Bridge-wide counters, not tied to a device.
    pub fn for_stats(stats: &PollStats) -> Result<Message> {
        Ok(Message {
            topic: "stats".to_string(),
            retain: false,
            payload: serde_json::to_string(stats)?,
        })
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

pub type Sender = broadcast::Sender<ChannelData>;

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PollStats>>,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper, channels: Channels, shared_stats: Arc<Mutex<PollStats>>) -> Self {
        Self {
            config,
            channels,
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = &self.config;

        if !c.mqtt().enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new("sbms-bridge", c.mqtt().host(), c.mqtt().port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.mqtt().username(), c.mqtt().password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.mqtt().host(), c.mqtt().port());

        let (client, eventloop) = AsyncClient::new(options, 10);

        futures::try_join!(
            self.setup(client.clone()),
            self.receiver(eventloop),
            self.sender(client)
        )?;

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    async fn setup(&self, client: AsyncClient) -> Result<()> {
        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        Ok(())
    }

    // drives the connection; nothing is subscribed so incoming traffic is
    // only acks and pings
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        let mut shutdown_rx = self.channels.to_mqtt.subscribe();

        loop {
            tokio::select! {
                msg = shutdown_rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                        _ => {}
                    }
                }

                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("mqtt connected"),
                        Ok(_) => {} // keepalives etc
                        Err(e) => {
                            error!("{}", e);
                            info!("reconnecting in {}s", RECONNECT_DELAY_SECS);
                            tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                        }
                    }
                }
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(&self, client: AsyncClient) -> Result<()> {
        let mut receiver = self.channels.to_mqtt.subscribe();

        loop {
            let message = match receiver.recv().await {
                Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Ok(ChannelData::Message(message)) => message,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("mqtt sender lagged, dropped {} messages", n);
                    self.count(|stats| stats.mqtt_errors += n);
                    continue;
                }
            };

            let topic = format!("{}/{}", self.config.mqtt().namespace(), message.topic);
            debug!("publishing: {} = {}", topic, message.payload);

            for attempt in 1..=PUBLISH_ATTEMPTS {
                match client
                    .publish(&topic, QoS::AtLeastOnce, message.retain, message.payload.as_bytes())
                    .await
                {
                    Ok(_) => {
                        self.count(|stats| stats.mqtt_messages_sent += 1);
                        break;
                    }
                    Err(err) => {
                        error!(
                            "MQTT publish to {} failed: {:?} (attempt {}/{})",
                            topic, err, attempt, PUBLISH_ATTEMPTS
                        );
                        self.count(|stats| stats.mqtt_errors += 1);
                        if attempt < PUBLISH_ATTEMPTS {
                            tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
                        }
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn count(&self, f: impl FnOnce(&mut PollStats)) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            f(&mut stats);
        }
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
