//! Fixed field layout of the SBMS0 `/rawData` literals.
//!
//! Offsets and widths are counted in UTF-16 code units and are a contract
//! with the controller firmware, so they live here as constants rather than
//! in configuration.

/// One positional field inside a code-unit literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }

    /// First code unit past the end of the field.
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }
}

pub const NUM_CELLS: usize = 8;

// sbms {{{
pub const YEAR: Field = Field::new("year", 0, 1);
pub const MONTH: Field = Field::new("month", 1, 1);
pub const DAY: Field = Field::new("day", 2, 1);
pub const HOUR: Field = Field::new("hour", 3, 1);
pub const MINUTE: Field = Field::new("minute", 4, 1);
pub const SECOND: Field = Field::new("second", 5, 1);
pub const SOC: Field = Field::new("soc", 6, 2);

pub const CELLS: [Field; NUM_CELLS] = [
    Field::new("cell1_mv", 8, 2),
    Field::new("cell2_mv", 10, 2),
    Field::new("cell3_mv", 12, 2),
    Field::new("cell4_mv", 14, 2),
    Field::new("cell5_mv", 16, 2),
    Field::new("cell6_mv", 18, 2),
    Field::new("cell7_mv", 20, 2),
    Field::new("cell8_mv", 22, 2),
];

pub const TEMP_INTERNAL: Field = Field::new("temp_internal", 24, 2);
pub const TEMP_EXTERNAL: Field = Field::new("temp_external", 26, 2);
pub const BATTERY_CURRENT_SIGN: Field = Field::new("battery_current_sign", 28, 1);
pub const BATTERY_CURRENT: Field = Field::new("battery_current", 29, 3);
pub const PV1_CURRENT: Field = Field::new("pv1_current", 32, 3);
pub const PV2_CURRENT: Field = Field::new("pv2_current", 35, 3);
pub const EXT_LOAD_CURRENT: Field = Field::new("ext_load_current", 38, 3);
pub const ADC2: Field = Field::new("adc2", 41, 3);
pub const ADC3: Field = Field::new("adc3", 44, 3);
pub const ADC4: Field = Field::new("adc4", 47, 3);
pub const HEAT1: Field = Field::new("heat1", 50, 3);
pub const HEAT2: Field = Field::new("heat2", 53, 3);
pub const STATUS: Field = Field::new("status", 56, 3);
// }}}

// xsbms {{{
pub const MAX_CELL_MV: Field = Field::new("max_cell_mv", 3, 2);
pub const MIN_CELL_MV: Field = Field::new("min_cell_mv", 5, 2);
pub const CELL_TYPE: Field = Field::new("cell_type", 7, 1);
pub const CAPACITY: Field = Field::new("capacity", 8, 3);
// }}}

// eW / eA {{{
pub const ENERGY_WIDTH: usize = 6;

/// Code point of `-` in the battery current sign slot.
pub const NEGATIVE_SIGN: u16 = 45;

/// Temperatures are reported in tenths of a degree offset by 45.0 °C.
pub const TEMP_OFFSET: f64 = 450.0;
pub const TEMP_SCALE: f64 = 10.0;

/// How a raw energy counter converts to reported Wh / Ah.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyChannel {
    pub name: &'static str,
    pub index: usize,
    pub wh_divisor: f64,
    pub ah_divisor: f64,
}

impl EnergyChannel {
    const fn scaled(name: &'static str, index: usize) -> Self {
        Self {
            name,
            index,
            wh_divisor: 10.0,
            ah_divisor: 1000.0,
        }
    }

    const fn unscaled(name: &'static str, index: usize) -> Self {
        Self {
            name,
            index,
            wh_divisor: 1.0,
            ah_divisor: 1.0,
        }
    }

    /// The channel occupies the same slot in both `eW` and `eA`.
    pub const fn field(&self) -> Field {
        Field::new(self.name, self.index * ENERGY_WIDTH, ENERGY_WIDTH)
    }
}

pub const ENERGY_BATTERY: EnergyChannel = EnergyChannel::scaled("battery", 0);
pub const ENERGY_PV1: EnergyChannel = EnergyChannel::scaled("pv1", 1);
pub const ENERGY_PV2: EnergyChannel = EnergyChannel::scaled("pv2", 2);
pub const ENERGY_DMPPT: EnergyChannel = EnergyChannel::unscaled("dmppt", 3);
// slot 4 is unused by the firmware
pub const ENERGY_LOAD: EnergyChannel = EnergyChannel::scaled("load", 5);
pub const ENERGY_EXT_LOAD: EnergyChannel = EnergyChannel::scaled("ext_load", 6);
// }}}
