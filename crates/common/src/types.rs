//! Common data types for the stream player.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a stream identifier, in bytes.
pub const MAX_STREAM_ID_LEN: usize = 256;

/// Punctuation accepted in a stream identifier besides ASCII alphanumerics.
///
/// None of these are URL-reserved, so a stream ID can be embedded in a CDN
/// path or query string without escaping.
pub const STREAM_ID_PUNCTUATION: &[char] = &['-', '_', '.'];

/// Reasons a stream identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamIdError {
    /// The identifier is empty.
    #[error("stream id is empty")]
    Empty,

    /// The identifier exceeds [`MAX_STREAM_ID_LEN`].
    #[error("stream id is {len} bytes, limit is {MAX_STREAM_ID_LEN}")]
    TooLong { len: usize },

    /// The identifier contains a character outside the allowed set.
    #[error("stream id contains disallowed character {ch:?} at byte {index}")]
    InvalidCharacter { ch: char, index: usize },
}

/// Unique identifier of a published audio/video stream.
///
/// Always holds a validated value: non-empty, at most 256 bytes, ASCII
/// alphanumerics plus [`STREAM_ID_PUNCTUATION`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

impl StreamId {
    /// Validate and wrap a stream identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StreamIdError`] describing the first violation found.
    pub fn parse(raw: impl Into<String>) -> Result<Self, StreamIdError> {
        let raw = raw.into();
        validate(&raw)?;
        Ok(Self(raw))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(raw: &str) -> Result<(), StreamIdError> {
    if raw.is_empty() {
        return Err(StreamIdError::Empty);
    }
    if raw.len() > MAX_STREAM_ID_LEN {
        return Err(StreamIdError::TooLong { len: raw.len() });
    }
    if let Some((index, ch)) = raw
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || STREAM_ID_PUNCTUATION.contains(ch)))
    {
        return Err(StreamIdError::InvalidCharacter { ch, index });
    }
    Ok(())
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StreamId {
    type Err = StreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StreamId {
    type Error = StreamIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for StreamId {
    type Error = StreamIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.0
    }
}
