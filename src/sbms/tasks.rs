//! Decoder for the `/debug` FreeRTOS task list.
//!
//! Each non-blank line is `name<TAB>state<TAB>priority<TAB>counter<TAB>percent%`,
//! sometimes with doubled tabs. Numeric columns are parsed leniently: a value
//! that does not parse is logged and reported as zero rather than dropping the
//! row or the whole report. The firmware prints `<1%` for tasks below one
//! percent; those read as zero without a warning.

use crate::prelude::*;
use num_enum::IntoPrimitive;
use serde::Serialize;

/// Published as its numeric code, see [`TaskState::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, Serialize)]
#[serde(into = "i8")]
#[repr(i8)]
pub enum TaskState {
    Running = 0,
    Ready = 1,
    Blocked = 2,
    Suspended = 3,
    Deleted = 4,
    Unknown = -1,
}

impl TaskState {
    pub fn from_label(label: &str) -> Self {
        match label {
            "RUN" => Self::Running,
            "RDY" => Self::Ready,
            "BLK" => Self::Blocked,
            "SUS" => Self::Suspended,
            "DEL" => Self::Deleted,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> i8 {
        self.into()
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Unknown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub state: TaskState,
    pub priority: u32,
    pub run_time_counter: u64,
    pub run_time_percent: f64,
}

fn lenient<T: std::str::FromStr + Default>(task: &str, column: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        warn!("task {}: unparsable {} {:?}, using 0", task, column, value);
        T::default()
    })
}

fn percent(task: &str, value: &str) -> f64 {
    let value = value.trim_end_matches('%');
    if value.starts_with('<') {
        trace!("task {}: run time percent {}%", task, value);
        return 0.0;
    }
    lenient(task, "run time percent", value)
}

impl TaskRecord {
    fn from_row(row: &str) -> Self {
        let mut task = Self::default();

        let columns = row.split('\t').map(str::trim).filter(|c| !c.is_empty());
        for (index, column) in columns.enumerate() {
            match index {
                0 => task.name = column.to_owned(),
                1 => task.state = TaskState::from_label(column),
                2 => task.priority = lenient(&task.name, "priority", column),
                3 => task.run_time_counter = lenient(&task.name, "run time counter", column),
                4 => task.run_time_percent = percent(&task.name, column),
                _ => {}
            }
        }

        task
    }
}

/// Decode a task report body; one record per non-blank line, in order.
pub fn decode(content: &[u8]) -> Vec<TaskRecord> {
    String::from_utf8_lossy(content)
        .split('\n')
        .filter(|row| !row.trim().is_empty())
        .map(TaskRecord::from_row)
        .collect()
}
