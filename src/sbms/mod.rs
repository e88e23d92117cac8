//! Electrodacus SBMS0 protocol: the `/rawData` telemetry decoder, the `/debug`
//! task report decoder and the HTTP poller that feeds them.
//!
//! Everything except [`device`] is a pure function of its input bytes.

pub mod dcmp;
pub mod device;
pub mod flags;
pub mod layout;
pub mod literal;
pub mod snapshot;
pub mod tasks;

pub use dcmp::{dcmp, CodeUnits};
pub use flags::Flags;
pub use literal::{Literals, RawData};
pub use snapshot::{Cell, Energy, EnergyCounters, Snapshot};
pub use tasks::{TaskRecord, TaskState};
