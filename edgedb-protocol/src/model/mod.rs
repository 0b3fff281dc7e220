/*!
Value types mirroring the server's scalar domains. These store the exact
wire representation (microsecond offsets, base-10000 digit groups) so that
round-trips through the binary protocol are lossless; conversions to the
ecosystem types (`chrono`, `num-bigint`, `bigdecimal`) are provided on top.
*/

mod bignum;
mod time;

pub use bignum::{BigInt, Decimal};
pub use time::{Datetime, Duration, LocalDate, LocalDatetime, LocalTime};

pub use uuid::Uuid;

use std::fmt;

/// A JSON document received from or sent to the server, kept as its string
/// form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json(pub(crate) String);

impl Json {
    /// Wraps a string that is known to contain valid JSON.
    ///
    /// The server validates its side; this constructor is for passing
    /// already-serialized documents as query arguments.
    pub fn new_unchecked(value: String) -> Json {
        Json(value)
    }
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for Json {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Json {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A conversion into an ecosystem type failed because the value does not
/// fit the target's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfRangeError;

impl fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        "value is out of range for the target type".fmt(f)
    }
}

impl std::error::Error for OutOfRangeError {}
