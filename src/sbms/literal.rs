//! Pulls `var name = literal;` assignments out of the `/rawData` body and
//! turns the ones we care about into typed values.

use crate::prelude::*;
use crate::sbms::dcmp::CodeUnits;
use crate::sbms::layout::NUM_CELLS;

use nom::{
    bytes::complete::{escaped, is_not, tag, take_till, take_while1},
    character::complete::{anychar, char, multispace0, multispace1},
    combinator::{opt, recognize},
    sequence::{delimited, pair, tuple},
    IResult,
};
use std::collections::HashMap;

pub const SBMS: &str = "sbms";
pub const XSBMS: &str = "xsbms";
pub const S2: &str = "s2";
pub const EW: &str = "eW";
pub const EA: &str = "eA";

// parsers {{{
fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

// a double-quoted string, honouring backslash escapes so a `;` or `"` inside
// it does not end the assignment early
fn quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        opt(escaped(is_not("\\\""), '\\', anychar)),
        char('"'),
    ))(input)
}

fn value(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(quoted), take_till(|c| c == ';')))(input)
}

fn assignment(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, (_, _, name, _, _, _, value, _)) = tuple((
        tag("var"),
        multispace1,
        identifier,
        multispace0,
        char('='),
        multispace0,
        value,
        char(';'),
    ))(input)?;

    Ok((rest, (name, value)))
} // }}}

/// Raw literal text keyed by variable name. Later assignments win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Literals(HashMap<String, String>);

impl Literals {
    pub fn extract(content: &[u8]) -> Self {
        let text = String::from_utf8_lossy(content);
        let mut literals = HashMap::new();

        for line in text.split('\n') {
            let mut rest = line;
            while let Some(pos) = rest.find("var") {
                let candidate = &rest[pos..];
                match assignment(candidate) {
                    Ok((remaining, (name, value))) => {
                        trace!("literal {} = {}", name, value);
                        literals.insert(name.to_owned(), value.to_owned());
                        rest = remaining;
                    }
                    Err(_) => rest = &candidate["var".len()..],
                }
            }
        }

        Self(literals)
    }

    pub fn get(&self, name: &'static str) -> Result<&str, DecodeError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or(DecodeError::MissingLiteral { name })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode a string literal into its UTF-16 code units.
    pub fn code_units(&self, name: &'static str) -> Result<CodeUnits, DecodeError> {
        Ok(CodeUnits::new(name, string_literal(self.get(name)?)))
    }

    pub fn int_array(&self, name: &'static str) -> Result<Vec<i64>, DecodeError> {
        int_array_literal(name, self.get(name)?)
    }
}

/// Strip the surrounding quotes (if any), undo the two escapes the firmware
/// emits and return the text as UTF-16 code units.
///
/// The unescape order matters: `\\` collapses first, then `\"`.
pub fn string_literal(value: &str) -> Vec<u16> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let stripped = stripped.strip_suffix('"').unwrap_or(stripped);

    stripped
        .replace("\\\\", "\\")
        .replace("\\\"", "\"")
        .encode_utf16()
        .collect()
}

/// Parse `[n1, n2, ...]`. Any entry that is not a base-10 integer fails the
/// whole literal.
pub fn int_array_literal(literal: &'static str, value: &str) -> Result<Vec<i64>, DecodeError> {
    let trimmed = value.trim();
    let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    inner
        .split(',')
        .map(|piece| {
            let piece = piece.trim();
            piece
                .parse::<i64>()
                .map_err(|source| DecodeError::MalformedArray {
                    literal,
                    fragment: piece.to_owned(),
                    source,
                })
        })
        .collect()
}

/// The typed literals a snapshot is decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawData {
    pub sbms: CodeUnits,
    pub xsbms: CodeUnits,
    pub e_w: CodeUnits,
    pub e_a: CodeUnits,
    /// Per-cell balancing, nonzero means balancing.
    pub s2: Vec<i64>,
}

impl RawData {
    pub fn parse(content: &[u8]) -> Result<Self, DecodeError> {
        Self::from_literals(&Literals::extract(content))
    }

    pub fn from_literals(literals: &Literals) -> Result<Self, DecodeError> {
        let s2 = literals.int_array(S2)?;
        if s2.len() < NUM_CELLS {
            return Err(DecodeError::ShortArray {
                literal: S2,
                expected: NUM_CELLS,
                actual: s2.len(),
            });
        }

        Ok(Self {
            sbms: literals.code_units(SBMS)?,
            xsbms: literals.code_units(XSBMS)?,
            e_w: literals.code_units(EW)?,
            e_a: literals.code_units(EA)?,
            s2,
        })
    }
}
