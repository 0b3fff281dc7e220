use std::error::Error;

use bytes::{Buf, Bytes};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use edgedb_protocol::descriptors::{ArrayTypeDescriptor, BaseScalarTypeDescriptor};
use edgedb_protocol::descriptors::{Descriptor, TypePos, Typedesc};
use edgedb_protocol::descriptors::{EnumerationTypeDescriptor, ObjectShapeDescriptor};
use edgedb_protocol::descriptors::{ScalarTypeDescriptor, SetDescriptor, ShapeElement};
use edgedb_protocol::descriptors::{TupleElement, TupleTypeDescriptor};
use edgedb_protocol::descriptors::NamedTupleTypeDescriptor;
use edgedb_protocol::encoding::Input;
use edgedb_protocol::errors::DecodeError;
use edgedb_protocol::features::ProtocolVersion;

mod base;

fn decode(bytes: &[u8]) -> Result<Vec<Descriptor>, DecodeError> {
    let bytes = Bytes::copy_from_slice(bytes);
    let mut input = Input::new(ProtocolVersion::current(), bytes);
    let mut result = Vec::new();
    while input.remaining() > 0 {
        result.push(Descriptor::decode(&mut input)?);
    }
    assert!(input.remaining() == 0);
    Ok(result)
}

#[test]
fn single_int() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05")?,
        vec![Descriptor::BaseScalar(BaseScalarTypeDescriptor {
            id: "00000000-0000-0000-0000-000000000105".parse::<Uuid>()?,
        })]
    );
    Ok(())
}

#[test]
fn derived_scalar() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x01"
            b"\x03\x92\x9a\x64\x4f\x4f\x64\x11\xec\x96\x63\x33\x13\x46\xaa\x2e\x9b"
            b"\0\0"
        ))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000101".parse::<Uuid>()?,
            }),
            Descriptor::Scalar(ScalarTypeDescriptor {
                id: "929a644f-4f64-11ec-9663-331346aa2e9b".parse::<Uuid>()?,
                base_type_pos: TypePos(0),
            }),
        ]
    );
    Ok(())
}

#[test]
fn object_shape() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(bconcat!(
            // std::uuid, std::str
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\0"
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x01"
            // shape { id (implicit), title }
            b"\x01\x5b\x0e\xcd\xa2\x4f\x64\x11\xec\xa8\xdf\x5b\x4f\x1d\x59\x92\x9e"
            b"\0\x02"
            b"\x01\0\0\0\x02id\0\0"
            b"\0\0\0\0\x05title\0\x01"
        ))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000100".parse::<Uuid>()?,
            }),
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000101".parse::<Uuid>()?,
            }),
            Descriptor::ObjectShape(ObjectShapeDescriptor {
                id: "5b0ecda2-4f64-11ec-a8df-5b4f1d59929e".parse::<Uuid>()?,
                elements: vec![
                    ShapeElement {
                        flag_implicit: true,
                        flag_link_property: false,
                        flag_link: false,
                        name: String::from("id"),
                        type_pos: TypePos(0),
                    },
                    ShapeElement {
                        flag_implicit: false,
                        flag_link_property: false,
                        flag_link: false,
                        name: String::from("title"),
                        type_pos: TypePos(1),
                    },
                ],
            }),
        ]
    );
    Ok(())
}

#[test]
fn tuple_and_named_tuple() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x03"
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x01"
            b"\x04\xd9\x36\x52\xca\x4f\x64\x11\xec\x87\x3b\xe3\x91\x5d\x91\xf2\x9c"
            b"\0\x02\0\0\0\x01"
        ))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000103".parse::<Uuid>()?,
            }),
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000101".parse::<Uuid>()?,
            }),
            Descriptor::Tuple(TupleTypeDescriptor {
                id: "d93652ca-4f64-11ec-873b-e3915d91f29c".parse::<Uuid>()?,
                element_types: vec![TypePos(0), TypePos(1)],
            }),
        ]
    );
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
            b"\x05\x71\x75\x97\x46\x4f\x65\x11\xec\x9c\x67\x8f\x8d\x0b\x60\x01\x5a"
            b"\0\x01\0\0\0\x03foo\0\0"
        ))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000105".parse::<Uuid>()?,
            }),
            Descriptor::NamedTuple(NamedTupleTypeDescriptor {
                id: "71759746-4f65-11ec-9c67-8f8d0b60015a".parse::<Uuid>()?,
                elements: vec![TupleElement {
                    name: String::from("foo"),
                    type_pos: TypePos(0),
                }],
            }),
        ]
    );
    Ok(())
}

#[test]
fn array_set_enum() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
            b"\x06\xe8\xbb\x9f\x76\x4f\x65\x11\xec\xb7\x23\x2f\x07\x07\xe7\x5c\x3f"
            b"\0\0\0\x01\xff\xff\xff\xff"
        ))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000105".parse::<Uuid>()?,
            }),
            Descriptor::Array(ArrayTypeDescriptor {
                id: "e8bb9f76-4f65-11ec-b723-2f0707e75c3f".parse::<Uuid>()?,
                type_pos: TypePos(0),
                dimensions: vec![-1],
            }),
        ]
    );
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
            b"\0\x0c\x59\x4c\xf6\x4f\x66\x11\xec\xaa\x87\x1f\xd1\x2f\xf5\xd3\x38"
            b"\0\0"
        ))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000105".parse::<Uuid>()?,
            }),
            Descriptor::Set(SetDescriptor {
                id: "0c594cf6-4f66-11ec-aa87-1fd12ff5d338".parse::<Uuid>()?,
                type_pos: TypePos(0),
            }),
        ]
    );
    assert_eq!(
        decode(bconcat!(
            b"\x07\x7c\x64\x55\x34\x4f\x66\x11\xec\x95\x6b\x63\x39\xa2\xc1\x91\x0f"
            b"\0\x02\0\0\0\x03red\0\0\0\x05green"
        ))?,
        vec![Descriptor::Enumeration(EnumerationTypeDescriptor {
            id: "7c645534-4f66-11ec-956b-6339a2c1910f".parse::<Uuid>()?,
            members: vec![String::from("red"), String::from("green")],
        })]
    );
    Ok(())
}

#[test]
fn unknown_tag_is_fatal() {
    let err = decode(b"\x0a\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05").unwrap_err();
    assert!(matches!(err, DecodeError::InvalidTypeDescriptor { descriptor: 0x0a, .. }));
}

#[test]
fn typedesc_root_position() -> Result<(), Box<dyn Error>> {
    let root_id = "e8bb9f76-4f65-11ec-b723-2f0707e75c3f".parse::<Uuid>()?;
    let blob = bconcat!(
        b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
        b"\x06\xe8\xbb\x9f\x76\x4f\x65\x11\xec\xb7\x23\x2f\x07\x07\xe7\x5c\x3f"
        b"\0\0\0\x01\xff\xff\xff\xff"
    )
    .clone()
    .freeze();
    let desc = Typedesc::decode_with_id(
        root_id,
        &mut Input::new(ProtocolVersion::current(), blob),
    )?;
    assert_eq!(desc.root_pos(), Some(TypePos(1)));
    assert_eq!(desc.id(), &root_id);

    // a zero root id with an empty blob describes "no value"
    let desc = Typedesc::decode_with_id(
        Uuid::from_u128(0),
        &mut Input::new(ProtocolVersion::current(), Bytes::new()),
    )?;
    assert_eq!(desc.root_pos(), None);
    Ok(())
}
