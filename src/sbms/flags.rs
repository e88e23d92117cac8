use crate::prelude::*;
use serde::Serialize;

/// Number of status bits the controller packs into the status field.
pub const FLAG_BITS: u32 = 15;

/// The 15 protection / status flags shown on page 3 of the SBMS display.
///
/// Fields are declared in bit order: the first field is the most significant
/// of the 15 bits, the last is bit 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub discharge_fet_active: bool,
    pub end_of_charge: bool,
    pub charge_fet_active: bool,
    pub eeprom_fail: bool,
    pub low_voltage_cell: bool,
    pub open_cell_wire: bool,
    pub cell_fail: bool,
    pub discharge_short_circuit: bool,
    pub discharge_over_current: bool,
    pub charge_over_current: bool,
    pub internal_over_temperature: bool,
    pub under_voltage_lock: bool,
    pub under_voltage: bool,
    pub over_voltage_lock: bool,
    pub over_voltage: bool,
}

/// Short names as labelled on the controller, in index order.
pub const FLAG_NAMES: [&str; FLAG_BITS as usize] = [
    "dfet", "eoc", "cfet", "eccf", "lvc", "open", "celf", "dsc", "doc", "coc", "iot", "uvlk",
    "uv", "ovlk", "ov",
];

impl Flags {
    /// Crack the raw status value. Index 0 is bit 14, index 14 is bit 0; bits
    /// above 14 carry no flag.
    pub fn from_status(raw: u64) -> Self {
        if raw >> FLAG_BITS != 0 {
            warn!("status {} has bits above bit {}, ignoring them", raw, FLAG_BITS - 1);
        }

        let bit = |index: u32| (raw >> (FLAG_BITS - 1 - index)) & 1 == 1;

        Self {
            discharge_fet_active: bit(0),
            end_of_charge: bit(1),
            charge_fet_active: bit(2),
            eeprom_fail: bit(3),
            low_voltage_cell: bit(4),
            open_cell_wire: bit(5),
            cell_fail: bit(6),
            discharge_short_circuit: bit(7),
            discharge_over_current: bit(8),
            charge_over_current: bit(9),
            internal_over_temperature: bit(10),
            under_voltage_lock: bit(11),
            under_voltage: bit(12),
            over_voltage_lock: bit(13),
            over_voltage: bit(14),
        }
    }

    pub fn as_array(&self) -> [bool; FLAG_BITS as usize] {
        [
            self.discharge_fet_active,
            self.end_of_charge,
            self.charge_fet_active,
            self.eeprom_fail,
            self.low_voltage_cell,
            self.open_cell_wire,
            self.cell_fail,
            self.discharge_short_circuit,
            self.discharge_over_current,
            self.charge_over_current,
            self.internal_over_temperature,
            self.under_voltage_lock,
            self.under_voltage,
            self.over_voltage_lock,
            self.over_voltage,
        ]
    }

    /// `(short name, asserted)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> {
        FLAG_NAMES.into_iter().zip(self.as_array())
    }

    /// Pack back into the 15-bit status value.
    pub fn bits(&self) -> u16 {
        self.as_array()
            .iter()
            .fold(0, |acc, &set| (acc << 1) | u16::from(set))
    }
}
