pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::channels::Channels;
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator::PollStats;
pub use crate::error::DecodeError;
pub use crate::mqtt;
pub use crate::sbms::{self, Snapshot, TaskRecord};
