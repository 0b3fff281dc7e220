/*!
Enumerations and carrier types shared between client and server messages.
*/

use bytes::Bytes;
use uuid::Uuid;

use crate::descriptors::Typedesc;
use crate::encoding::Input;
use crate::errors::{self, DecodeError};
use crate::features::ProtocolVersion;

/// The expected or actual shape of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cardinality {
    NoResult = 0x6e,
    AtMostOne = 0x6f,
    One = 0x41,
    Many = 0x6d,
    AtLeastOne = 0x4d,
}

/// Serialization of the result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IoFormat {
    Binary = 0x62,
    Json = 0x6a,
    JsonElements = 0x4a,
}

/// The aspect requested by a `DescribeStatement` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescribeAspect {
    DataDescription = 0x54,
}

bitflags::bitflags! {
    /// Capability bits advertised in prepare headers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u64 {
        const MODIFICATIONS =       0b00000001;
        const SESSION_CONFIG =      0b00000010;
        const TRANSACTION =         0b00000100;
        const DDL =                 0b00001000;
        const PERSISTENT_CONFIG =   0b00010000;
        const ALL =                 0b00011111;
    }
}

/// An undecoded type description: the server-assigned id plus the raw blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTypedesc {
    pub proto: ProtocolVersion,
    pub id: Uuid,
    pub data: Bytes,
}

impl RawTypedesc {
    pub fn uninitialized() -> RawTypedesc {
        RawTypedesc {
            proto: ProtocolVersion::current(),
            id: Uuid::from_u128(0),
            data: Bytes::new(),
        }
    }

    pub fn decode(&self) -> Result<Typedesc, DecodeError> {
        let cur = &mut Input::new(self.proto.clone(), self.data.clone());
        Typedesc::decode_with_id(self.id, cur)
    }
}

impl TryFrom<u8> for Cardinality {
    type Error = DecodeError;
    fn try_from(cardinality: u8) -> Result<Cardinality, DecodeError> {
        match cardinality {
            0x6e => Ok(Cardinality::NoResult),
            0x6f => Ok(Cardinality::AtMostOne),
            0x41 => Ok(Cardinality::One),
            0x6d => Ok(Cardinality::Many),
            0x4d => Ok(Cardinality::AtLeastOne),
            _ => errors::InvalidCardinality { cardinality }.fail(),
        }
    }
}

impl TryFrom<u8> for IoFormat {
    type Error = DecodeError;
    fn try_from(io_format: u8) -> Result<IoFormat, DecodeError> {
        match io_format {
            0x62 => Ok(IoFormat::Binary),
            0x6a => Ok(IoFormat::Json),
            0x4a => Ok(IoFormat::JsonElements),
            _ => errors::InvalidIoFormat { io_format }.fail(),
        }
    }
}

impl TryFrom<u8> for DescribeAspect {
    type Error = DecodeError;
    fn try_from(aspect: u8) -> Result<DescribeAspect, DecodeError> {
        match aspect {
            0x54 => Ok(DescribeAspect::DataDescription),
            _ => errors::InvalidAspect { aspect }.fail(),
        }
    }
}
