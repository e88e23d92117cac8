use crate::prelude::*;
use crate::sbms::dcmp::CodeUnits;
use crate::sbms::flags::Flags;
use crate::sbms::layout::{self, EnergyChannel, NUM_CELLS};
use crate::sbms::literal::{self, RawData};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub millivolts: u64,
    pub balancing: bool,
}

/// One cumulative energy counter pair.
///
/// A reading of exactly zero may mean the controller has not measured the
/// channel yet; the decoder reports it as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Energy {
    pub wh: f64,
    pub ah: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnergyCounters {
    pub battery: Energy,
    pub pv1: Energy,
    pub pv2: Energy,
    pub dmppt: Energy,
    pub load: Energy,
    pub ext_load: Energy,
}

/// Decoded state of one SBMS0 at the moment it rendered `/rawData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Controller clock, `20YY-MM-DDTHH:MM:SS`, no zone.
    pub timestamp: String,
    /// State of charge, percent.
    pub soc: u64,
    pub cells: [Cell; NUM_CELLS],
    /// Sum of the cell voltages.
    pub battery_voltage_mv: u64,
    pub min_cell_mv: u64,
    pub max_cell_mv: u64,
    /// Degrees Celsius.
    pub internal_temperature: f64,
    pub external_temperature: f64,
    /// Negative while discharging.
    pub battery_current_ma: i64,
    pub pv1_current_ma: u64,
    pub pv2_current_ma: u64,
    pub ext_load_current_ma: u64,
    pub battery_power_w: f64,
    pub adc2: u64,
    pub adc3: u64,
    pub adc4: u64,
    pub heat1: u64,
    pub heat2: u64,
    pub flags: Flags,
    pub energy: EnergyCounters,
    pub cell_type: u64,
    pub capacity_ah: u64,
    /// The packed flag value the `flags` were cracked from.
    pub status: u64,
}

impl Snapshot {
    /// Decode a complete `/rawData` response body.
    pub fn decode(content: &[u8]) -> Result<Self, DecodeError> {
        Self::from_raw(&RawData::parse(content)?)
    }

    pub fn from_raw(raw: &RawData) -> Result<Self, DecodeError> {
        if raw.s2.len() < NUM_CELLS {
            return Err(DecodeError::ShortArray {
                literal: literal::S2,
                expected: NUM_CELLS,
                actual: raw.s2.len(),
            });
        }

        let sbms = &raw.sbms;

        let timestamp = format!(
            "20{}-{:02}-{:02}T{:02}:{:02}:{:02}",
            sbms.field(&layout::YEAR)?,
            sbms.field(&layout::MONTH)?,
            sbms.field(&layout::DAY)?,
            sbms.field(&layout::HOUR)?,
            sbms.field(&layout::MINUTE)?,
            sbms.field(&layout::SECOND)?,
        );

        let mut cells = [Cell::default(); NUM_CELLS];
        for ((cell, field), &balancing) in cells.iter_mut().zip(&layout::CELLS).zip(&raw.s2) {
            *cell = Cell {
                millivolts: sbms.field(field)?,
                balancing: balancing != 0,
            };
        }
        let battery_voltage_mv: u64 = cells.iter().map(|c| c.millivolts).sum();

        let sign = if sbms.unit(&layout::BATTERY_CURRENT_SIGN)? == layout::NEGATIVE_SIGN {
            -1
        } else {
            1
        };
        let battery_current_ma = sbms.field(&layout::BATTERY_CURRENT)? as i64 * sign;
        let battery_power_w =
            battery_voltage_mv as f64 / 1000.0 * battery_current_ma as f64 / 1000.0;

        let status = sbms.field(&layout::STATUS)?;

        Ok(Self {
            timestamp,
            soc: sbms.field(&layout::SOC)?,
            cells,
            battery_voltage_mv,
            min_cell_mv: raw.xsbms.field(&layout::MIN_CELL_MV)?,
            max_cell_mv: raw.xsbms.field(&layout::MAX_CELL_MV)?,
            internal_temperature: temperature(sbms.field(&layout::TEMP_INTERNAL)?),
            external_temperature: temperature(sbms.field(&layout::TEMP_EXTERNAL)?),
            battery_current_ma,
            pv1_current_ma: sbms.field(&layout::PV1_CURRENT)?,
            pv2_current_ma: sbms.field(&layout::PV2_CURRENT)?,
            ext_load_current_ma: sbms.field(&layout::EXT_LOAD_CURRENT)?,
            battery_power_w,
            adc2: sbms.field(&layout::ADC2)?,
            adc3: sbms.field(&layout::ADC3)?,
            adc4: sbms.field(&layout::ADC4)?,
            heat1: sbms.field(&layout::HEAT1)?,
            heat2: sbms.field(&layout::HEAT2)?,
            flags: Flags::from_status(status),
            energy: EnergyCounters {
                battery: energy(raw, &layout::ENERGY_BATTERY)?,
                pv1: energy(raw, &layout::ENERGY_PV1)?,
                pv2: energy(raw, &layout::ENERGY_PV2)?,
                dmppt: energy(raw, &layout::ENERGY_DMPPT)?,
                load: energy(raw, &layout::ENERGY_LOAD)?,
                ext_load: energy(raw, &layout::ENERGY_EXT_LOAD)?,
            },
            cell_type: raw.xsbms.field(&layout::CELL_TYPE)?,
            capacity_ah: raw.xsbms.field(&layout::CAPACITY)?,
            status,
        })
    }

    /// The controller clock as a date, if it reported a real one.
    pub fn datetime(&self) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S").ok()
    }

    pub fn balancing_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.balancing)
            .map(|(i, _)| i + 1)
    }
}

fn temperature(raw: u64) -> f64 {
    (raw as f64 - layout::TEMP_OFFSET) / layout::TEMP_SCALE
}

fn energy(raw: &RawData, channel: &EnergyChannel) -> Result<Energy, DecodeError> {
    let field = channel.field();
    Ok(Energy {
        wh: scaled(&raw.e_w, &field, channel.wh_divisor)?,
        ah: scaled(&raw.e_a, &field, channel.ah_divisor)?,
    })
}

fn scaled(units: &CodeUnits, field: &layout::Field, divisor: f64) -> Result<f64, DecodeError> {
    Ok(units.field(field)? as f64 / divisor)
}
