use crate::prelude::*;
use crate::sbms::device;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_device: device::Sender,
    pub to_device: device::Sender,
    pub to_mqtt: mqtt::Sender,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_device: Self::channel(),
            to_device: Self::channel(),
            to_mqtt: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
