use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const RAW_DATA_PATH: &str = "/rawData";
pub const DEBUG_PATH: &str = "/debug";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub devices: Vec<Device>,

    #[serde(default = "Config::default_mqtt")]
    pub mqtt: Mqtt,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Optional path to append every snapshot to, one JSON object per line
    pub datalog_file: Option<String>,
}

// Device {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub name: String,
    pub host: String,

    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_read_timeout")]
    pub read_timeout: Duration,

    /// Also poll the `/debug` task list
    #[serde(default)]
    pub tasks: bool,
}

impl Device {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_owned(),
            host: host.to_owned(),
            enabled: Config::default_enabled(),
            poll_interval: Config::default_poll_interval(),
            read_timeout: Config::default_read_timeout(),
            tasks: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn tasks(&self) -> bool {
        self.tasks
    }

    pub fn raw_data_url(&self) -> Result<Url> {
        normalise_url(&self.host, RAW_DATA_PATH)
    }

    pub fn debug_url(&self) -> Result<Url> {
        normalise_url(&self.host, DEBUG_PATH)
    }
} // }}}

// Mqtt {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    /// How often `PollStats` go out on `<namespace>/stats`; 0 disables
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_stats_interval")]
    pub stats_interval: Duration,
}

impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        Some(self.stats_interval).filter(|i| !i.is_zero())
    }
} // }}}

/// Accept a bare host, host/path or full URL for a device and turn it into
/// the URL to poll. Without a scheme `http://` is assumed; without a path the
/// endpoint's default path is used. An explicit path, even just `/`, is kept
/// so the bridge can sit behind a proxy.
pub fn normalise_url(raw: &str, default_path: &str) -> Result<Url> {
    let raw = raw.trim();
    let full = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("http://{}", raw)
    };

    let mut url = Url::parse(&full).map_err(|err| anyhow!("invalid device url {:?}: {}", raw, err))?;
    if url.host_str().map_or(true, str::is_empty) {
        bail!("device url {:?} has no host", raw);
    }

    let has_path = match full.split_once("://") {
        Some((_, rest)) => rest.contains('/'),
        None => false,
    };
    if !has_path {
        url.set_path(default_path);
    }

    Ok(url)
}

#[derive(Clone, Debug)]
pub struct ConfigWrapper {
    config: Arc<Config>,
}

impl ConfigWrapper {
    pub fn new(file: &str) -> Result<Self> {
        Ok(Self::from_config(Config::new(file)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.config.devices
    }

    pub fn enabled_devices(&self) -> Vec<Device> {
        self.devices().iter().filter(|d| d.enabled()).cloned().collect()
    }

    pub fn device_with_name(&self, name: &str) -> Option<&Device> {
        self.devices().iter().find(|d| d.name() == name)
    }

    pub fn mqtt(&self) -> &Mqtt {
        &self.config.mqtt
    }

    pub fn loglevel(&self) -> &str {
        &self.config.loglevel
    }

    pub fn datalog_file(&self) -> Option<&str> {
        self.config.datalog_file.as_deref()
    }

    /// Log what was loaded; called once logging is up.
    pub fn log_summary(&self) {
        let config = &self.config;

        info!("Configuration loaded successfully:");
        info!(
            "  Devices: {} configured, {} enabled",
            config.devices.len(),
            config.devices.iter().filter(|d| d.enabled).count()
        );
        for (i, device) in config.devices.iter().enumerate() {
            info!("    Device[{}]:", i);
            info!("      Name: {}", device.name);
            info!("      Enabled: {}", device.enabled);
            info!("      Host: {}", device.host);
            info!("      Poll Interval: {}s", device.poll_interval.as_secs());
            info!("      Read Timeout: {}s", device.read_timeout.as_secs());
            info!("      Task Report: {}", device.tasks);
        }

        info!("  MQTT: {}", if config.mqtt.enabled { "enabled" } else { "disabled" });
        if config.mqtt.enabled {
            info!("    Host: {}", config.mqtt.host);
            info!("    Port: {}", config.mqtt.port);
            info!("    Namespace: {}", config.mqtt.namespace);
            match config.mqtt.stats_interval() {
                Some(i) => info!("    Stats every {}s", i.as_secs()),
                None => info!("    Stats: disabled"),
            }
        }

        if let Some(file) = &config.datalog_file {
            info!("  Datalog File: {}", file);
        }
        info!("  Log Level: {}", config.loglevel);
    }
}

impl Config {
    pub fn new(file: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
        }

        let mut names = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            if device.name.is_empty() {
                bail!("device[{}].name cannot be empty", i);
            }
            if !names.insert(device.name.as_str()) {
                bail!("device[{}].name {:?} is used more than once", i, device.name);
            }
            if device.poll_interval.is_zero() {
                bail!("device[{}].poll_interval must be at least 1 second", i);
            }
            if device.read_timeout.is_zero() {
                bail!("device[{}].read_timeout must be at least 1 second", i);
            }
            device
                .raw_data_url()
                .map_err(|err| anyhow!("device[{}].host: {}", i, err))?;
        }

        Ok(())
    }

    fn default_mqtt() -> Mqtt {
        Mqtt {
            enabled: false,
            host: "localhost".to_string(),
            port: Self::default_mqtt_port(),
            username: None,
            password: None,
            namespace: Self::default_mqtt_namespace(),
            stats_interval: Self::default_stats_interval(),
        }
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "sbms".to_string()
    }

    fn default_stats_interval() -> Duration {
        Duration::from_secs(60)
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_poll_interval() -> Duration {
        Duration::from_secs(10)
    }

    fn default_read_timeout() -> Duration {
        Duration::from_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> String {
        normalise_url(raw, RAW_DATA_PATH).unwrap().to_string()
    }

    #[test]
    fn url_bare_ip() {
        assert_eq!(url("192.168.1.1"), "http://192.168.1.1/rawData");
    }

    #[test]
    fn url_single_slash_is_kept() {
        assert_eq!(url("192.168.1.1/"), "http://192.168.1.1/");
        assert_eq!(url("https://sbms.local/"), "https://sbms.local/");
    }

    #[test]
    fn url_with_path() {
        assert_eq!(url("192.168.1.1/some/sub/path"), "http://192.168.1.1/some/sub/path");
    }

    #[test]
    fn url_with_scheme() {
        assert_eq!(url("https://192.168.1.1"), "https://192.168.1.1/rawData");
        assert_eq!(url("http://192.168.1.1"), "http://192.168.1.1/rawData");
        assert_eq!(url("http://sbms.local"), "http://sbms.local/rawData");
    }

    #[test]
    fn url_debug_path() {
        let device = Device::new("garage", "sbms.local:8080");
        assert_eq!(device.debug_url().unwrap().as_str(), "http://sbms.local:8080/debug");
    }

    #[test]
    fn url_rejects_empty() {
        assert!(normalise_url("", RAW_DATA_PATH).is_err());
        assert!(normalise_url("http://", RAW_DATA_PATH).is_err());
    }

    #[test]
    fn parses_with_defaults() -> Result<()> {
        let config = Config::from_yaml(
            "devices:\n  - name: garage\n    host: 192.168.1.50\n  - name: shed\n    host: shed.local\n    poll_interval: 30\n    tasks: true\n    enabled: false\n",
        )?;

        assert_eq!(config.loglevel, "info");
        assert!(!config.mqtt.enabled());
        assert_eq!(config.devices[0].poll_interval(), Duration::from_secs(10));
        assert_eq!(config.devices[0].read_timeout(), Duration::from_secs(5));
        assert!(!config.devices[0].tasks());
        assert_eq!(config.devices[1].poll_interval(), Duration::from_secs(30));
        assert!(config.devices[1].tasks());

        let wrapper = ConfigWrapper::from_config(config);
        assert_eq!(wrapper.enabled_devices().len(), 1);
        assert!(wrapper.device_with_name("shed").is_some());
        assert_eq!(wrapper.datalog_file(), None);

        Ok(())
    }

    #[test]
    fn parses_mqtt() -> Result<()> {
        let config = Config::from_yaml(
            "devices: []\nmqtt:\n  host: broker\n  username: u\n  password: p\ndatalog_file: /tmp/x.jsonl\n",
        )?;
        assert!(config.mqtt.enabled());
        assert_eq!(config.mqtt.port(), 1883);
        assert_eq!(config.mqtt.namespace(), "sbms");
        assert_eq!(config.mqtt.username().as_deref(), Some("u"));
        assert_eq!(config.mqtt.stats_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.datalog_file.as_deref(), Some("/tmp/x.jsonl"));
        Ok(())
    }

    #[test]
    fn stats_interval_zero_disables() -> Result<()> {
        let config = Config::from_yaml("devices: []\nmqtt:\n  host: broker\n  stats_interval: 0\n")?;
        assert_eq!(config.mqtt.stats_interval(), None);

        let config = Config::from_yaml("devices: []\nmqtt:\n  host: broker\n  stats_interval: 15\n")?;
        assert_eq!(config.mqtt.stats_interval(), Some(Duration::from_secs(15)));
        Ok(())
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Config::from_yaml(
            "devices:\n  - name: a\n    host: h1\n  - name: a\n    host: h2\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(Config::from_yaml("devices:\n  - name: a\n    host: h\n    poll_interval: 0\n").is_err());
    }

    #[test]
    fn reads_file() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "devices:\n  - name: a\n    host: h\n")?;
        let wrapper = ConfigWrapper::new(file.path().to_str().unwrap())?;
        assert_eq!(wrapper.devices().len(), 1);
        assert!(ConfigWrapper::new("/nonexistent/config.yaml").is_err());
        Ok(())
    }
}
