/*!
Type descriptors: the server's description of a prepared query's input and
output types, from which [codecs](crate::codec) are derived.

A descriptor blob is a plain concatenation of entries, each
`tag:u8, type_id:uuid, payload`. Entries may reference earlier entries by
position only, so the blob forms a DAG over a positional array and can be
materialised bottom-up.
*/

use bytes::Buf;
use snafu::ensure;
use uuid::Uuid;

use crate::encoding::{Decode, Input};
use crate::errors::{self, DecodeError};

/// A reference to an earlier position in the same descriptor blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypePos(pub u16);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Set(SetDescriptor),
    ObjectShape(ObjectShapeDescriptor),
    BaseScalar(BaseScalarTypeDescriptor),
    Scalar(ScalarTypeDescriptor),
    Tuple(TupleTypeDescriptor),
    NamedTuple(NamedTupleTypeDescriptor),
    Array(ArrayTypeDescriptor),
    Enumeration(EnumerationTypeDescriptor),
    InputShape(InputShapeTypeDescriptor),
    Range(RangeTypeDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDescriptor {
    pub id: Uuid,
    pub type_pos: TypePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectShapeDescriptor {
    pub id: Uuid,
    pub elements: Vec<ShapeElement>,
}

/// One field of an object or input shape. Flag bits on the wire:
/// bit 0 implicit, bit 1 link property, bit 2 link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeElement {
    pub flag_implicit: bool,
    pub flag_link_property: bool,
    pub flag_link: bool,
    pub name: String,
    pub type_pos: TypePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseScalarTypeDescriptor {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarTypeDescriptor {
    pub id: Uuid,
    pub base_type_pos: TypePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleTypeDescriptor {
    pub id: Uuid,
    pub element_types: Vec<TypePos>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTupleTypeDescriptor {
    pub id: Uuid,
    pub elements: Vec<TupleElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleElement {
    pub name: String,
    pub type_pos: TypePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayTypeDescriptor {
    pub id: Uuid,
    pub type_pos: TypePos,
    /// Dimension sizes; `-1` marks an unbound dimension.
    pub dimensions: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationTypeDescriptor {
    pub id: Uuid,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputShapeTypeDescriptor {
    pub id: Uuid,
    pub elements: Vec<ShapeElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTypeDescriptor {
    pub id: Uuid,
    pub type_pos: TypePos,
}

/// A fully parsed descriptor blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typedesc {
    pub(crate) array: Vec<Descriptor>,
    pub(crate) root_id: Uuid,
    pub(crate) root_pos: Option<TypePos>,
}

impl Descriptor {
    pub fn id(&self) -> &Uuid {
        use Descriptor::*;
        match self {
            Set(i) => &i.id,
            ObjectShape(i) => &i.id,
            BaseScalar(i) => &i.id,
            Scalar(i) => &i.id,
            Tuple(i) => &i.id,
            NamedTuple(i) => &i.id,
            Array(i) => &i.id,
            Enumeration(i) => &i.id,
            InputShape(i) => &i.id,
            Range(i) => &i.id,
        }
    }

    pub fn decode(buf: &mut Input) -> Result<Descriptor, DecodeError> {
        ensure!(buf.remaining() >= 1, errors::Underflow);
        match buf[0] {
            0x00 => SetDescriptor::decode(buf).map(Descriptor::Set),
            0x01 => ObjectShapeDescriptor::decode(buf).map(Descriptor::ObjectShape),
            0x02 => BaseScalarTypeDescriptor::decode(buf).map(Descriptor::BaseScalar),
            0x03 => ScalarTypeDescriptor::decode(buf).map(Descriptor::Scalar),
            0x04 => TupleTypeDescriptor::decode(buf).map(Descriptor::Tuple),
            0x05 => NamedTupleTypeDescriptor::decode(buf).map(Descriptor::NamedTuple),
            0x06 => ArrayTypeDescriptor::decode(buf).map(Descriptor::Array),
            0x07 => EnumerationTypeDescriptor::decode(buf).map(Descriptor::Enumeration),
            0x08 => InputShapeTypeDescriptor::decode(buf).map(Descriptor::InputShape),
            0x09 => RangeTypeDescriptor::decode(buf).map(Descriptor::Range),
            descriptor => errors::InvalidTypeDescriptor { descriptor }.fail(),
        }
    }
}

fn decode_tag_and_id(buf: &mut Input) -> Result<Uuid, DecodeError> {
    ensure!(buf.remaining() >= 17, errors::Underflow);
    buf.advance(1);
    Uuid::decode(buf)
}

fn decode_type_pos(buf: &mut Input) -> Result<TypePos, DecodeError> {
    ensure!(buf.remaining() >= 2, errors::Underflow);
    Ok(TypePos(buf.get_u16()))
}

impl Decode for SetDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        let type_pos = decode_type_pos(buf)?;
        Ok(SetDescriptor { id, type_pos })
    }
}

fn decode_shape_elements(buf: &mut Input) -> Result<Vec<ShapeElement>, DecodeError> {
    ensure!(buf.remaining() >= 2, errors::Underflow);
    let element_count = buf.get_u16();
    let mut elements = Vec::with_capacity(element_count.into());
    for _ in 0..element_count {
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let flags = buf.get_u8();
        let name = String::decode(buf)?;
        let type_pos = decode_type_pos(buf)?;
        elements.push(ShapeElement {
            flag_implicit: flags & 0b001 != 0,
            flag_link_property: flags & 0b010 != 0,
            flag_link: flags & 0b100 != 0,
            name,
            type_pos,
        });
    }
    Ok(elements)
}

impl Decode for ObjectShapeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        let elements = decode_shape_elements(buf)?;
        Ok(ObjectShapeDescriptor { id, elements })
    }
}

impl Decode for InputShapeTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        let elements = decode_shape_elements(buf)?;
        Ok(InputShapeTypeDescriptor { id, elements })
    }
}

impl Decode for BaseScalarTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        Ok(BaseScalarTypeDescriptor { id })
    }
}

impl Decode for ScalarTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        let base_type_pos = decode_type_pos(buf)?;
        Ok(ScalarTypeDescriptor { id, base_type_pos })
    }
}

impl Decode for TupleTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let element_count = buf.get_u16();
        let mut element_types = Vec::with_capacity(element_count.into());
        for _ in 0..element_count {
            element_types.push(decode_type_pos(buf)?);
        }
        Ok(TupleTypeDescriptor { id, element_types })
    }
}

impl Decode for NamedTupleTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let element_count = buf.get_u16();
        let mut elements = Vec::with_capacity(element_count.into());
        for _ in 0..element_count {
            let name = String::decode(buf)?;
            let type_pos = decode_type_pos(buf)?;
            elements.push(TupleElement { name, type_pos });
        }
        Ok(NamedTupleTypeDescriptor { id, elements })
    }
}

impl Decode for ArrayTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        let type_pos = decode_type_pos(buf)?;
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let dimension_count = buf.get_u16();
        ensure!(buf.remaining() >= 4 * usize::from(dimension_count), errors::Underflow);
        let mut dimensions = Vec::with_capacity(dimension_count.into());
        for _ in 0..dimension_count {
            dimensions.push(buf.get_i32());
        }
        Ok(ArrayTypeDescriptor {
            id,
            type_pos,
            dimensions,
        })
    }
}

impl Decode for EnumerationTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let member_count = buf.get_u16();
        let mut members = Vec::with_capacity(member_count.into());
        for _ in 0..member_count {
            members.push(String::decode(buf)?);
        }
        Ok(EnumerationTypeDescriptor { id, members })
    }
}

impl Decode for RangeTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let id = decode_tag_and_id(buf)?;
        let type_pos = decode_type_pos(buf)?;
        Ok(RangeTypeDescriptor { id, type_pos })
    }
}

impl Typedesc {
    /// Parses a full blob. A zero `root_id` with an empty blob describes the
    /// absence of a value (e.g. the output of a statement with no result).
    pub fn decode_with_id(root_id: Uuid, buf: &mut Input) -> Result<Typedesc, DecodeError> {
        let mut array = Vec::new();
        while buf.remaining() > 0 {
            ensure!(
                array.len() <= u16::MAX.into(),
                errors::TooManyDescriptors { index: array.len() }
            );
            array.push(Descriptor::decode(buf)?);
        }
        let root_pos = if root_id == Uuid::from_u128(0) {
            None
        } else {
            let idx = array
                .iter()
                .position(|d| *d.id() == root_id)
                .ok_or_else(|| errors::UuidNotFound { uuid: root_id }.build())?;
            Some(TypePos(idx as u16))
        };
        Ok(Typedesc {
            array,
            root_id,
            root_pos,
        })
    }

    pub fn nothing() -> Typedesc {
        Typedesc {
            array: Vec::new(),
            root_id: Uuid::from_u128(0),
            root_pos: None,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.root_id
    }
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.array
    }
    pub fn root_pos(&self) -> Option<TypePos> {
        self.root_pos
    }
    pub fn is_empty_tuple(&self) -> bool {
        match self.root_pos.map(|pos| self.array.get(pos.0 as usize)) {
            Some(Some(Descriptor::Tuple(t))) => t.element_types.is_empty(),
            _ => self.root_pos.is_none(),
        }
    }
}
