use thiserror::Error;

/// Why an identifier was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("'{input}' is not a {expected} identifier")]
    ForeignPrefix {
        expected: &'static str,
        input: String,
    },

    #[error("'{0}' has no '_' between prefix and ulid")]
    NoSeparator(String),

    #[error("'{input}' carries a malformed ulid: {reason}")]
    MalformedUlid { input: String, reason: String },
}

/// Splits `{prefix}_{ulid}` and decodes the ulid half.
///
/// Shared by every type generated with [`define_id!`](crate::define_id).
#[doc(hidden)]
pub fn decode_prefixed(input: &str, prefix: &'static str) -> Result<ulid::Ulid, IdError> {
    if input.is_empty() {
        return Err(IdError::Empty);
    }
    let (head, tail) = input
        .split_once('_')
        .ok_or_else(|| IdError::NoSeparator(input.to_string()))?;
    if head != prefix {
        return Err(IdError::ForeignPrefix {
            expected: prefix,
            input: input.to_string(),
        });
    }
    tail.parse().map_err(|e: ulid::DecodeError| IdError::MalformedUlid {
        input: input.to_string(),
        reason: e.to_string(),
    })
}
