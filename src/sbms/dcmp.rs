use crate::prelude::*;
use crate::sbms::layout::Field;

/// Base of the positional numeral system used in the telemetry literals.
pub const BASE: u64 = 91;

/// Code point that represents digit zero (`#`).
pub const DIGIT_ZERO: u16 = 35;

/// Decode `count` code units starting at `offset` as one big-endian base-91
/// number. The leftmost unit is the most significant digit and each digit is
/// its code point minus 35.
///
/// Total over any input of sufficient length; units below `#` count as zero
/// and a run too wide for `u64` saturates at `u64::MAX`. The caller
/// guarantees `offset + count <= units.len()`, see [`CodeUnits::field`] for
/// the checked form.
pub fn dcmp(units: &[u16], offset: usize, count: usize) -> u64 {
    units[offset..offset + count].iter().fold(0u64, |sum, &unit| {
        sum.saturating_mul(BASE)
            .saturating_add(u64::from(unit.saturating_sub(DIGIT_ZERO)))
    })
}

/// A string literal from the response, as UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnits {
    literal: &'static str,
    units: Vec<u16>,
}

impl CodeUnits {
    pub fn new(literal: &'static str, units: Vec<u16>) -> Self {
        Self { literal, units }
    }

    pub fn literal(&self) -> &'static str {
        self.literal
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.units
    }

    fn check(&self, field: &Field) -> Result<(), DecodeError> {
        if field.end() > self.units.len() {
            return Err(DecodeError::LayoutOverrun {
                literal: self.literal,
                field: field.name,
                offset: field.offset,
                width: field.width,
                len: self.units.len(),
            });
        }
        Ok(())
    }

    /// Decode one field, reporting an overrun instead of reading past the end.
    pub fn field(&self, field: &Field) -> Result<u64, DecodeError> {
        self.check(field)?;
        let value = dcmp(&self.units, field.offset, field.width);
        trace!(
            "{}.{} offset={} count={} units={:?} value={}",
            self.literal,
            field.name,
            field.offset,
            field.width,
            &self.units[field.offset..field.end()],
            value
        );
        Ok(value)
    }

    /// The raw code unit of a single-width field, for marker slots.
    pub fn unit(&self, field: &Field) -> Result<u16, DecodeError> {
        self.check(field)?;
        Ok(self.units[field.offset])
    }
}
