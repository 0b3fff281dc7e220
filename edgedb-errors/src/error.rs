use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use bytes::Bytes;

use crate::kinds::{error_name, tag_check};
use crate::traits::ErrorKind;

/// A behavioural tag attached to some error classes, e.g.
/// [`SHOULD_RECONNECT`](crate::kinds::SHOULD_RECONNECT).
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub(crate) bit: u32,
}

/// The error type returned by every fallible driver operation.
///
/// Carries a hierarchical 32-bit code identifying the error class (the
/// leading non-zero bytes name the family), a stack of context messages, an
/// optional source error and the raw attributes of a server `ErrorResponse`.
pub struct Error(pub(crate) Box<Inner>);

pub(crate) struct Inner {
    pub(crate) code: u32,
    pub(crate) messages: Vec<Cow<'static, str>>,
    pub(crate) error: Option<Box<dyn StdError + Send + Sync + 'static>>,
    pub(crate) attributes: HashMap<u16, Bytes>,
}

impl Error {
    pub fn is<T: ErrorKind>(&self) -> bool {
        T::is_superclass_of(self)
    }

    pub fn code(&self) -> u32 {
        self.0.code
    }

    /// The name of the most specific known class containing this code.
    pub fn kind_name(&self) -> &'static str {
        error_name(self.0.code)
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        tag_check(self.0.code, tag.bit)
    }

    /// Constructs an error from a raw wire code, e.g. one received in an
    /// `ErrorResponse`. Codes outside the known table still compare
    /// correctly against their containing classes.
    pub fn from_code(code: u32) -> Error {
        Error(Box::new(Inner {
            code,
            messages: Vec::new(),
            error: None,
            attributes: Default::default(),
        }))
    }

    /// Adds a context message. The most recent context is displayed first.
    pub fn context(mut self, message: impl Into<Cow<'static, str>>) -> Error {
        self.0.messages.push(message.into());
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<u16, Bytes>) -> Error {
        self.0.attributes = attributes;
        self
    }

    /// The message closest to the origin of the error, if any.
    pub fn initial_message(&self) -> Option<&str> {
        self.0.messages.first().map(|m| m.as_ref())
    }

    pub fn attributes(&self) -> &HashMap<u16, Bytes> {
        &self.0.attributes
    }

    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.0.error.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind_name())?;
        for message in self.0.messages.iter().rev() {
            write!(f, ": {message}")?;
        }
        if let Some(source) = &self.0.error {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [0x{:08X}]", self.kind_name(), self.0.code)?;
        for message in self.0.messages.iter().rev() {
            write!(f, ": {message}")?;
        }
        if let Some(source) = &self.0.error {
            write!(f, ": {source:?}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0
            .error
            .as_ref()
            .map(|b| b.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::*;
    use crate::traits::ErrorKind;

    #[test]
    fn subclass_containment() {
        let err = Error::from_code(0x03010001);
        assert!(err.is::<UnsupportedProtocolVersionError>());
        assert!(err.is::<BinaryProtocolError>());
        assert!(err.is::<ProtocolError>());
        assert!(!err.is::<QueryError>());
        assert_eq!(err.kind_name(), "UnsupportedProtocolVersionError");
    }

    #[test]
    fn unknown_code_maps_to_family() {
        // A subclass code we don't know still belongs to its family.
        let err = Error::from_code(0x04010177);
        assert!(err.is::<InvalidSyntaxError>());
        assert!(err.is::<QueryError>());
    }

    #[test]
    fn tags() {
        assert!(ClientConnectionTimeoutError::build().has_tag(SHOULD_RECONNECT));
        assert!(ClientConnectionTimeoutError::build().has_tag(SHOULD_RETRY));
        assert!(!ProtocolError::build().has_tag(SHOULD_RETRY));
    }

    #[test]
    fn display_nests_context() {
        let err = ClientConnectionError::with_message("no endpoints")
            .context("while connecting");
        assert_eq!(
            err.to_string(),
            "ClientConnectionError: while connecting: no endpoints"
        );
    }
}
