use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use test_case::test_case;
use uuid::Uuid;

use edgedb_protocol::codec::{self, build_codec, Codec, CodecCache};
use edgedb_protocol::descriptors::{ArrayTypeDescriptor, BaseScalarTypeDescriptor};
use edgedb_protocol::descriptors::{Descriptor, TypePos};
use edgedb_protocol::descriptors::{EnumerationTypeDescriptor, ObjectShapeDescriptor};
use edgedb_protocol::descriptors::{SetDescriptor, ShapeElement, TupleTypeDescriptor};
use edgedb_protocol::errors::EncodeError;
use edgedb_protocol::model;
use edgedb_protocol::value::Value;

mod base;

fn scalar(id: u128) -> Descriptor {
    Descriptor::BaseScalar(BaseScalarTypeDescriptor {
        id: Uuid::from_u128(id),
    })
}

fn build(descriptors: &[Descriptor]) -> Arc<dyn Codec> {
    let cache = CodecCache::new();
    build_codec(
        Some(TypePos(descriptors.len() as u16 - 1)),
        descriptors,
        &cache,
    )
    .expect("codec builds")
}

fn roundtrip(codec: &Arc<dyn Codec>, value: Value) -> Value {
    let mut buf = BytesMut::new();
    codec.encode(&mut buf, &value).expect("encodes");
    codec.decode(&buf.freeze()).expect("decodes")
}

#[test_case(0x103, Value::Int16(-1) ; "int16")]
#[test_case(0x104, Value::Int32(8_000_000) ; "int32")]
#[test_case(0x105, Value::Int64(-(1 << 40)) ; "int64")]
#[test_case(0x106, Value::Float32(0.5) ; "float32")]
#[test_case(0x107, Value::Float64(3.5e-10) ; "float64")]
#[test_case(0x101, Value::Str(String::from("hello")) ; "str")]
#[test_case(0x102, Value::Bytes(Bytes::from_static(b"\x00\xff")) ; "bytes")]
#[test_case(0x109, Value::Bool(true) ; "bool")]
#[test_case(0x100, Value::Uuid("6af73743-4f65-11ec-b123-1b0f86a58b9f".parse().unwrap()) ; "uuid")]
#[test_case(0x10a, Value::Datetime(model::Datetime::from_postgres_micros(698_694_305_000_000)) ; "datetime")]
#[test_case(0x10c, Value::LocalDate(model::LocalDate::from_postgres_days(8086)) ; "local date")]
#[test_case(0x10d, Value::LocalTime(model::LocalTime::try_from_micros(86_399_999_999).unwrap()) ; "local time")]
#[test_case(0x10e, Value::Duration(model::Duration::from_micros(-5_500_000)) ; "duration")]
#[test_case(0x10f, Value::Json(model::Json::new_unchecked(String::from("{\"a\": 1}"))) ; "json")]
fn scalar_roundtrip(id: u128, value: Value) {
    let codec = build(&[scalar(id)]);
    assert_eq!(roundtrip(&codec, value.clone()), value);
}

#[test]
fn float_nan_sentinel() {
    let codec = build(&[scalar(0x106)]);
    let mut buf = BytesMut::new();
    codec.encode(&mut buf, &Value::Float32(f32::NAN)).unwrap();
    match codec.decode(&buf.freeze()).unwrap() {
        Value::Float32(value) => assert!(value.is_nan()),
        other => panic!("unexpected {other:?}"),
    }

    let codec = build(&[scalar(0x107)]);
    for value in [f64::INFINITY, f64::NEG_INFINITY] {
        assert_eq!(roundtrip(&codec, Value::Float64(value)), Value::Float64(value));
    }
}

#[test]
fn uuid_accepts_text() {
    let codec = build(&[scalar(0x100)]);
    let uuid: Uuid = "6af73743-4f65-11ec-b123-1b0f86a58b9f".parse().unwrap();
    let mut buf = BytesMut::new();
    codec
        .encode(&mut buf, &Value::Str(uuid.to_string()))
        .unwrap();
    assert_eq!(codec.decode(&buf.freeze()).unwrap(), Value::Uuid(uuid));
}

#[test_case("0" ; "zero")]
#[test_case("-0.000001" ; "negative millionth")]
#[test_case("123456789.987654321" ; "long fraction")]
#[test_case("1e20" ; "exponent form")]
fn decimal_exact_roundtrip(text: &str) {
    let codec = build(&[scalar(0x108)]);
    let source = BigDecimal::from_str(text).unwrap();
    let value = Value::Decimal(model::Decimal::try_from(&source).unwrap());
    assert_eq!(roundtrip(&codec, value.clone()), value);
}

#[test]
fn bigint_exact_roundtrip() {
    let codec = build(&[scalar(0x110)]);
    let value = Value::BigInt(model::BigInt::from(-123_456_789_012_345i64));
    assert_eq!(roundtrip(&codec, value.clone()), value);
}

#[test]
fn encoder_rejects_out_of_domain() {
    let codec = build(&[scalar(0x106)]);
    let mut buf = BytesMut::new();
    let err: EncodeError = codec
        .encode(&mut buf, &Value::Str("something".into()))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "value can not be encoded as std::float32: \"something\""
    );
    // nothing is written on rejection
    assert_eq!(buf.len(), 0);
}

#[test]
fn positional_argument_envelope() {
    let codec = build(&[
        scalar(0x104),
        Descriptor::Tuple(TupleTypeDescriptor {
            id: Uuid::from_u128(0x11),
            element_types: vec![TypePos(0)],
        }),
    ]);
    let mut buf = BytesMut::new();
    codec
        .encode(&mut buf, &Value::Tuple(vec![Value::Int32(1)]))
        .unwrap();
    assert_eq!(
        &buf[..],
        b"\0\0\0\x01\0\0\0\0\0\0\0\x04\0\0\0\x01"
    );
}

#[test]
fn empty_tuple() {
    let codec = build(&[Descriptor::Tuple(TupleTypeDescriptor {
        id: Uuid::from_u128(0xFF),
        element_types: vec![],
    })]);
    assert_eq!(
        codec.decode(b"\0\0\0\0").unwrap(),
        Value::Tuple(vec![])
    );
    let mut buf = BytesMut::new();
    codec.encode(&mut buf, &Value::Tuple(vec![])).unwrap();
    assert_eq!(&buf[..], b"\0\0\0\0");
}

#[test]
fn array_envelope() {
    let codec = build(&[
        scalar(0x105),
        Descriptor::Array(ArrayTypeDescriptor {
            id: Uuid::from_u128(0x12),
            type_pos: TypePos(0),
            dimensions: vec![-1],
        }),
    ]);
    let value = Value::Array(vec![Value::Int64(1), Value::Int64(2)]);
    let mut buf = BytesMut::new();
    codec.encode(&mut buf, &value).unwrap();
    assert_eq!(
        &buf[..],
        &bconcat!(b"\0\0\0\x01\0\0\0\0\0\0\0\0"
                  b"\0\0\0\x02\0\0\0\x01"
                  b"\0\0\0\x08\0\0\0\0\0\0\0\x01"
                  b"\0\0\0\x08\0\0\0\0\0\0\0\x02")[..]
    );
    assert_eq!(codec.decode(&buf.freeze()).unwrap(), value);
}

#[test]
fn empty_envelope_decodes_to_empty() {
    // ndims = 0 yields the empty sequence regardless of the inner codec
    let array = build(&[
        scalar(0x105),
        Descriptor::Array(ArrayTypeDescriptor {
            id: Uuid::from_u128(0x12),
            type_pos: TypePos(0),
            dimensions: vec![-1],
        }),
    ]);
    assert_eq!(
        array.decode(b"\0\0\0\0\0\0\0\0\0\0\0\0").unwrap(),
        Value::Array(vec![])
    );

    let set = build(&[
        scalar(0x101),
        Descriptor::Set(SetDescriptor {
            id: Uuid::from_u128(0x13),
            type_pos: TypePos(0),
        }),
    ]);
    assert_eq!(
        set.decode(b"\0\0\0\0\0\0\0\0\0\0\0\0").unwrap(),
        Value::Set(vec![])
    );
}

#[test]
fn object_preserves_order_and_flags() {
    let codec = build(&[
        scalar(0x100),
        scalar(0x101),
        Descriptor::ObjectShape(ObjectShapeDescriptor {
            id: Uuid::from_u128(0x14),
            elements: vec![
                ShapeElement {
                    flag_implicit: true,
                    flag_link_property: false,
                    flag_link: false,
                    name: "id".into(),
                    type_pos: TypePos(0),
                },
                ShapeElement {
                    flag_implicit: false,
                    flag_link_property: false,
                    flag_link: false,
                    name: "title".into(),
                    type_pos: TypePos(1),
                },
            ],
        }),
    ]);
    let uuid: Uuid = "6af73743-4f65-11ec-b123-1b0f86a58b9f".parse().unwrap();
    let mut data = BytesMut::new();
    data.extend(b"\0\0\0\x02");
    data.extend(b"\0\0\0\0\0\0\0\x10");
    data.extend(uuid.as_bytes());
    data.extend(b"\0\0\0\0\0\0\0\x05title");
    let decoded = codec.decode(&data.freeze()).unwrap();
    match decoded {
        Value::Object { shape, fields } => {
            let elements = shape.elements();
            assert_eq!(elements.len(), 2);
            assert!(elements[0].flag_implicit);
            assert_eq!(elements[0].name, "id");
            assert!(!elements[1].flag_implicit);
            assert_eq!(elements[1].name, "title");
            assert_eq!(fields[0], Some(Value::Uuid(uuid)));
            assert_eq!(fields[1], Some(Value::Str("title".into())));
        }
        other => panic!("unexpected {other:?}"),
    }

    // objects only flow server -> client
    let mut buf = BytesMut::new();
    assert!(codec.encode(&mut buf, &Value::Tuple(vec![])).is_err());
}

#[test]
fn enum_membership() {
    let codec = build(&[Descriptor::Enumeration(EnumerationTypeDescriptor {
        id: Uuid::from_u128(0x15),
        members: vec!["red".into(), "green".into()],
    })]);
    let decoded = codec.decode(b"red").unwrap();
    match &decoded {
        Value::Enum(member) => assert_eq!(member.as_ref(), "red"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(codec.decode(b"blue").is_err());

    let mut buf = BytesMut::new();
    codec.encode(&mut buf, &Value::Str("green".into())).unwrap();
    assert_eq!(&buf[..], b"green");
    let mut buf = BytesMut::new();
    assert!(codec.encode(&mut buf, &Value::Str("blue".into())).is_err());
}

#[test]
fn codec_cache_reuses_by_type_id() {
    let cache = CodecCache::new();
    let descriptors = [scalar(0x105)];
    let first = build_codec(Some(TypePos(0)), &descriptors, &cache).unwrap();
    let second = build_codec(Some(TypePos(0)), &descriptors, &cache).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.contains(&Uuid::from_u128(0x105)));
}

#[test]
fn unknown_base_scalar_is_fatal() {
    let cache = CodecCache::new();
    let descriptors = [scalar(0xdead)];
    assert!(build_codec(Some(TypePos(0)), &descriptors, &cache).is_err());
    assert!(!cache.contains(&Uuid::from_u128(0xdead)));
}

#[test]
fn base_scalar_table_is_complete() {
    for id in [
        codec::STD_UUID,
        codec::STD_STR,
        codec::STD_BYTES,
        codec::STD_INT16,
        codec::STD_INT32,
        codec::STD_INT64,
        codec::STD_FLOAT32,
        codec::STD_FLOAT64,
        codec::STD_DECIMAL,
        codec::STD_BOOL,
        codec::STD_DATETIME,
        codec::CAL_LOCAL_DATETIME,
        codec::CAL_LOCAL_DATE,
        codec::CAL_LOCAL_TIME,
        codec::STD_DURATION,
        codec::STD_JSON,
        codec::STD_BIGINT,
    ] {
        assert!(codec::scalar_codec(&id).is_ok(), "{id}");
    }
}
