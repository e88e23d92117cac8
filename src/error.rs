use std::num::ParseIntError;

/// Everything that can go wrong turning a `/rawData` body into a snapshot.
///
/// Decoding never panics on bad input; callers get one of these instead and
/// can decide whether it looks like a garbled scrape or a changed protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("required literal `{name}` not found in response")]
    MissingLiteral { name: &'static str },

    #[error("literal `{literal}` has a malformed entry {fragment:?}: {source}")]
    MalformedArray {
        literal: &'static str,
        fragment: String,
        #[source]
        source: ParseIntError,
    },

    #[error(
        "literal `{literal}` too short for field {field}: needs {offset}+{width} code units, has {len}"
    )]
    LayoutOverrun {
        literal: &'static str,
        field: &'static str,
        offset: usize,
        width: usize,
        len: usize,
    },

    #[error("literal `{literal}` has {actual} entries, expected at least {expected}")]
    ShortArray {
        literal: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl DecodeError {
    /// The literal (or field within it) the error refers to.
    pub fn literal(&self) -> &'static str {
        match self {
            Self::MissingLiteral { name } => name,
            Self::MalformedArray { literal, .. }
            | Self::LayoutOverrun { literal, .. }
            | Self::ShortArray { literal, .. } => literal,
        }
    }
}
