use std::borrow::Cow;
use std::error::Error as StdError;

use crate::error::{Error, Inner};

/// Sealed supertrait carrying the wire-level constants of an error class.
///
/// Implemented only by the marker types in [`crate::kinds`].
pub trait Sealed {
    const CODE: u32;
    const NAME: &'static str;
    const TAGS: u32;
}

/// Returns the mask selecting the class prefix of a hierarchical error code.
///
/// Codes are four bytes wide; a class owns every code sharing its non-zero
/// leading bytes.
pub(crate) fn code_mask(code: u32) -> u32 {
    if code & 0x00_00_00_FF != 0 {
        0xFF_FF_FF_FF
    } else if code & 0x00_00_FF_00 != 0 {
        0xFF_FF_FF_00
    } else if code & 0x00_FF_00_00 != 0 {
        0xFF_FF_00_00
    } else {
        0xFF_00_00_00
    }
}

/// A class of errors.
///
/// Classes form a hierarchy defined by their code prefixes: an
/// `InvalidArgumentError` (`0xFF020103`) is a `QueryArgumentError`
/// (`0xFF020100`), an `InterfaceError` (`0xFF020000`) and a `ClientError`
/// (`0xFF000000`).
pub trait ErrorKind: Sealed {
    fn is_superclass_of(error: &Error) -> bool {
        error.code() & code_mask(Self::CODE) == Self::CODE
    }

    fn build() -> Error {
        Error(Box::new(Inner {
            code: Self::CODE,
            messages: Vec::new(),
            error: None,
            attributes: Default::default(),
        }))
    }

    fn with_message(message: impl Into<Cow<'static, str>>) -> Error {
        Self::build().context(message)
    }

    fn with_source(source: impl StdError + Send + Sync + 'static) -> Error {
        let mut err = Self::build();
        err.0.error = Some(Box::new(source));
        err
    }
}
