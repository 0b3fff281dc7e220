/*!
Value codecs: the recursive encoders/decoders derived from
[type descriptors](crate::descriptors).

Codecs are identified by their 16-byte type id; two codecs with the same id
are behaviourally identical, so the process-wide [CodecCache] keys on the id
alone. Codec trees are deeply immutable once built.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, BytesMut};
use snafu::{ensure, OptionExt, ResultExt};
use uuid::Uuid;

use crate::descriptors::{Descriptor, TypePos, Typedesc};
use crate::errors::{self, invalid_value, CodecError, DecodeError, EncodeError};
use crate::model;
use crate::value::{EnumValue, NamedTupleShape, ObjectShape, ShapeElement, Value};

pub const STD_UUID: Uuid = Uuid::from_u128(0x100);
pub const STD_STR: Uuid = Uuid::from_u128(0x101);
pub const STD_BYTES: Uuid = Uuid::from_u128(0x102);
pub const STD_INT16: Uuid = Uuid::from_u128(0x103);
pub const STD_INT32: Uuid = Uuid::from_u128(0x104);
pub const STD_INT64: Uuid = Uuid::from_u128(0x105);
pub const STD_FLOAT32: Uuid = Uuid::from_u128(0x106);
pub const STD_FLOAT64: Uuid = Uuid::from_u128(0x107);
pub const STD_DECIMAL: Uuid = Uuid::from_u128(0x108);
pub const STD_BOOL: Uuid = Uuid::from_u128(0x109);
pub const STD_DATETIME: Uuid = Uuid::from_u128(0x10a);
pub const CAL_LOCAL_DATETIME: Uuid = Uuid::from_u128(0x10b);
pub const CAL_LOCAL_DATE: Uuid = Uuid::from_u128(0x10c);
pub const CAL_LOCAL_TIME: Uuid = Uuid::from_u128(0x10d);
pub const STD_DURATION: Uuid = Uuid::from_u128(0x10e);
pub const STD_JSON: Uuid = Uuid::from_u128(0x10f);
pub const STD_BIGINT: Uuid = Uuid::from_u128(0x110);

pub trait Codec: fmt::Debug + Send + Sync + 'static {
    fn decode(&self, buf: &[u8]) -> Result<Value, DecodeError>;
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError>;
}

/// Process-wide cache of materialised codecs, keyed by type id.
///
/// Entries are immutable once inserted; a concurrent insert under the same
/// id simply wins the slot with an identical codec.
#[derive(Debug, Default)]
pub struct CodecCache {
    codecs: Mutex<HashMap<Uuid, Arc<dyn Codec>>>,
}

impl CodecCache {
    pub fn new() -> CodecCache {
        CodecCache::default()
    }
    pub fn get(&self, id: &Uuid) -> Option<Arc<dyn Codec>> {
        self.codecs.lock().expect("codec cache poisoned").get(id).cloned()
    }
    pub fn contains(&self, id: &Uuid) -> bool {
        self.codecs.lock().expect("codec cache poisoned").contains_key(id)
    }
    fn insert(&self, id: Uuid, codec: Arc<dyn Codec>) -> Arc<dyn Codec> {
        self.codecs
            .lock()
            .expect("codec cache poisoned")
            .insert(id, codec.clone());
        codec
    }
}

impl Typedesc {
    /// Materialises the codec tree for this description, reusing and
    /// populating the shared cache. Idempotent: the same blob always yields
    /// the same codec identities.
    pub fn build_codec(&self, cache: &CodecCache) -> Result<Arc<dyn Codec>, CodecError> {
        build_codec(self.root_pos(), self.descriptors(), cache)
    }
}

pub fn build_codec(
    root_pos: Option<TypePos>,
    descriptors: &[Descriptor],
    cache: &CodecCache,
) -> Result<Arc<dyn Codec>, CodecError> {
    let mut materialized: Vec<Arc<dyn Codec>> = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let id = *descriptor.id();
        let codec = match cache.get(&id) {
            Some(codec) => codec,
            None => cache.insert(id, build_descriptor(descriptor, &materialized)?),
        };
        materialized.push(codec);
    }
    match root_pos {
        Some(pos) => find(&materialized, pos),
        None => Ok(Arc::new(Nothing {})),
    }
}

/// Looks up the codec for a well-known base scalar.
///
/// An id outside this table is a protocol defect of the server and is
/// treated as fatal by the caller.
pub fn scalar_codec(uuid: &Uuid) -> Result<Arc<dyn Codec>, CodecError> {
    match *uuid {
        STD_UUID => Ok(Arc::new(UuidCodec {})),
        STD_STR => Ok(Arc::new(Str {})),
        STD_BYTES => Ok(Arc::new(BytesCodec {})),
        STD_INT16 => Ok(Arc::new(Int16 {})),
        STD_INT32 => Ok(Arc::new(Int32 {})),
        STD_INT64 => Ok(Arc::new(Int64 {})),
        STD_FLOAT32 => Ok(Arc::new(Float32 {})),
        STD_FLOAT64 => Ok(Arc::new(Float64 {})),
        STD_DECIMAL => Ok(Arc::new(Decimal {})),
        STD_BOOL => Ok(Arc::new(Bool {})),
        STD_DATETIME => Ok(Arc::new(Datetime {})),
        CAL_LOCAL_DATETIME => Ok(Arc::new(LocalDatetime {})),
        CAL_LOCAL_DATE => Ok(Arc::new(LocalDate {})),
        CAL_LOCAL_TIME => Ok(Arc::new(LocalTime {})),
        STD_DURATION => Ok(Arc::new(Duration {})),
        STD_JSON => Ok(Arc::new(Json {})),
        STD_BIGINT => Ok(Arc::new(BigInt {})),
        _ => errors::UndefinedBaseScalar { uuid: *uuid }.fail(),
    }
}

fn find(codecs: &[Arc<dyn Codec>], pos: TypePos) -> Result<Arc<dyn Codec>, CodecError> {
    codecs
        .get(pos.0 as usize)
        .cloned()
        .context(errors::UnexpectedTypePos { position: pos.0 })
}

fn build_descriptor(
    descriptor: &Descriptor,
    codecs: &[Arc<dyn Codec>],
) -> Result<Arc<dyn Codec>, CodecError> {
    use Descriptor as D;
    match descriptor {
        D::BaseScalar(base) => scalar_codec(&base.id),
        // A scalar alias shares the behaviour of its base type.
        D::Scalar(scalar) => find(codecs, scalar.base_type_pos),
        D::Set(d) => Ok(Arc::new(SetCodec {
            element: find(codecs, d.type_pos)?,
        })),
        D::ObjectShape(d) => Ok(Arc::new(ObjectCodec {
            shape: ObjectShape::new(
                d.elements
                    .iter()
                    .map(|e| ShapeElement {
                        flag_implicit: e.flag_implicit,
                        flag_link_property: e.flag_link_property,
                        flag_link: e.flag_link,
                        name: e.name.clone(),
                    })
                    .collect(),
            ),
            codecs: d
                .elements
                .iter()
                .map(|e| find(codecs, e.type_pos))
                .collect::<Result<_, _>>()?,
        })),
        D::InputShape(d) => Ok(Arc::new(InputShapeCodec {
            shape: ObjectShape::new(
                d.elements
                    .iter()
                    .map(|e| ShapeElement {
                        flag_implicit: e.flag_implicit,
                        flag_link_property: e.flag_link_property,
                        flag_link: e.flag_link,
                        name: e.name.clone(),
                    })
                    .collect(),
            ),
            codecs: d
                .elements
                .iter()
                .map(|e| find(codecs, e.type_pos))
                .collect::<Result<_, _>>()?,
        })),
        D::Tuple(d) => Ok(Arc::new(TupleCodec {
            elements: d
                .element_types
                .iter()
                .map(|&pos| find(codecs, pos))
                .collect::<Result<_, _>>()?,
        })),
        D::NamedTuple(d) => Ok(Arc::new(NamedTupleCodec {
            shape: NamedTupleShape::new(d.elements.iter().map(|e| e.name.clone()).collect()),
            elements: d
                .elements
                .iter()
                .map(|e| find(codecs, e.type_pos))
                .collect::<Result<_, _>>()?,
        })),
        D::Array(d) => Ok(Arc::new(ArrayCodec {
            element: find(codecs, d.type_pos)?,
        })),
        D::Enumeration(d) => Ok(Arc::new(EnumCodec {
            members: d.members.iter().map(|m| m.as_str().into()).collect(),
        })),
        D::Range(d) => Ok(Arc::new(RangeCodec {
            element: find(codecs, d.type_pos)?,
        })),
    }
}

#[derive(Debug)]
pub struct Nothing {}
#[derive(Debug)]
pub struct UuidCodec {}
#[derive(Debug)]
pub struct Str {}
#[derive(Debug)]
pub struct BytesCodec {}
#[derive(Debug)]
pub struct Int16 {}
#[derive(Debug)]
pub struct Int32 {}
#[derive(Debug)]
pub struct Int64 {}
#[derive(Debug)]
pub struct Float32 {}
#[derive(Debug)]
pub struct Float64 {}
#[derive(Debug)]
pub struct Decimal {}
#[derive(Debug)]
pub struct BigInt {}
#[derive(Debug)]
pub struct Bool {}
#[derive(Debug)]
pub struct Datetime {}
#[derive(Debug)]
pub struct LocalDatetime {}
#[derive(Debug)]
pub struct LocalDate {}
#[derive(Debug)]
pub struct LocalTime {}
#[derive(Debug)]
pub struct Duration {}
#[derive(Debug)]
pub struct Json {}

#[derive(Debug)]
pub struct SetCodec {
    element: Arc<dyn Codec>,
}

#[derive(Debug)]
pub struct ArrayCodec {
    element: Arc<dyn Codec>,
}

#[derive(Debug)]
pub struct TupleCodec {
    elements: Vec<Arc<dyn Codec>>,
}

#[derive(Debug)]
pub struct NamedTupleCodec {
    shape: NamedTupleShape,
    elements: Vec<Arc<dyn Codec>>,
}

#[derive(Debug)]
pub struct ObjectCodec {
    shape: ObjectShape,
    codecs: Vec<Arc<dyn Codec>>,
}

#[derive(Debug)]
pub struct InputShapeCodec {
    shape: ObjectShape,
    codecs: Vec<Arc<dyn Codec>>,
}

#[derive(Debug)]
pub struct EnumCodec {
    members: Vec<Arc<str>>,
}

#[derive(Debug)]
pub struct RangeCodec {
    element: Arc<dyn Codec>,
}

impl Codec for Nothing {
    fn decode(&self, buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.is_empty(), errors::ExtraData);
        Ok(Value::Nothing)
    }
    fn encode(&self, _buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Nothing => Ok(()),
            _ => Err(invalid_value("nothing", value)),
        }
    }
}

impl Codec for Int16 {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let value = buf.get_i16();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Int16(value))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Int16(value) => {
                buf.reserve(2);
                buf.put_i16(*value);
                Ok(())
            }
            _ => Err(invalid_value("std::int16", value)),
        }
    }
}

impl Codec for Int32 {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let value = buf.get_i32();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Int32(value))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Int32(value) => {
                buf.reserve(4);
                buf.put_i32(*value);
                Ok(())
            }
            _ => Err(invalid_value("std::int32", value)),
        }
    }
}

impl Codec for Int64 {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 8, errors::Underflow);
        let value = buf.get_i64();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Int64(value))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Int64(value) => {
                buf.reserve(8);
                buf.put_i64(*value);
                Ok(())
            }
            _ => Err(invalid_value("std::int64", value)),
        }
    }
}

impl Codec for Float32 {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let value = buf.get_f32();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Float32(value))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Float32(value) => {
                buf.reserve(4);
                buf.put_f32(*value);
                Ok(())
            }
            _ => Err(invalid_value("std::float32", value)),
        }
    }
}

impl Codec for Float64 {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 8, errors::Underflow);
        let value = buf.get_f64();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Float64(value))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Float64(value) => {
                buf.reserve(8);
                buf.put_f64(*value);
                Ok(())
            }
            _ => Err(invalid_value("std::float64", value)),
        }
    }
}

impl Codec for Str {
    fn decode(&self, buf: &[u8]) -> Result<Value, DecodeError> {
        let text = std::str::from_utf8(buf).context(errors::InvalidUtf8)?;
        Ok(Value::Str(text.to_owned()))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Str(value) => {
                buf.extend(value.as_bytes());
                Ok(())
            }
            _ => Err(invalid_value("std::str", value)),
        }
    }
}

impl Codec for BytesCodec {
    fn decode(&self, buf: &[u8]) -> Result<Value, DecodeError> {
        Ok(Value::Bytes(bytes::Bytes::copy_from_slice(buf)))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Bytes(value) => {
                buf.extend(&value[..]);
                Ok(())
            }
            _ => Err(invalid_value("std::bytes", value)),
        }
    }
}

impl Codec for UuidCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 16, errors::Underflow);
        let mut bytes = [0u8; 16];
        buf.copy_to_slice(&mut bytes);
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Uuid(Uuid::from_bytes(bytes)))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        // Canonical text is accepted alongside the raw value.
        let uuid = match value {
            Value::Uuid(uuid) => *uuid,
            Value::Str(text) => match text.parse::<Uuid>() {
                Ok(uuid) => uuid,
                Err(_) => return Err(invalid_value("std::uuid", value)),
            },
            _ => return Err(invalid_value("std::uuid", value)),
        };
        buf.reserve(16);
        buf.extend(uuid.as_bytes());
        Ok(())
    }
}

impl Codec for Bool {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let value = buf.get_u8();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        match value {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            val => errors::InvalidBool { val }.fail(),
        }
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Bool(value) => {
                buf.reserve(1);
                buf.put_u8(*value as u8);
                Ok(())
            }
            _ => Err(invalid_value("std::bool", value)),
        }
    }
}

impl Codec for Datetime {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 8, errors::Underflow);
        let micros = buf.get_i64();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Datetime(model::Datetime::from_postgres_micros(micros)))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Datetime(value) => {
                buf.reserve(8);
                buf.put_i64(value.postgres_micros());
                Ok(())
            }
            _ => Err(invalid_value("std::datetime", value)),
        }
    }
}

impl Codec for LocalDatetime {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 8, errors::Underflow);
        let micros = buf.get_i64();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::LocalDatetime(model::LocalDatetime::from_postgres_micros(micros)))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::LocalDatetime(value) => {
                buf.reserve(8);
                buf.put_i64(value.postgres_micros());
                Ok(())
            }
            _ => Err(invalid_value("cal::local_datetime", value)),
        }
    }
}

impl Codec for LocalDate {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let days = buf.get_i32();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::LocalDate(model::LocalDate::from_postgres_days(days)))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::LocalDate(value) => {
                buf.reserve(4);
                buf.put_i32(value.postgres_days());
                Ok(())
            }
            _ => Err(invalid_value("cal::local_date", value)),
        }
    }
}

impl Codec for LocalTime {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 8, errors::Underflow);
        let micros = buf.get_i64();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        let time = u64::try_from(micros)
            .ok()
            .and_then(|m| model::LocalTime::try_from_micros(m).ok())
            .ok_or_else(|| errors::InvalidDate.build())?;
        Ok(Value::LocalTime(time))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::LocalTime(value) => {
                buf.reserve(8);
                buf.put_i64(value.micros() as i64);
                Ok(())
            }
            _ => Err(invalid_value("cal::local_time", value)),
        }
    }
}

impl Codec for Duration {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 16, errors::Underflow);
        let micros = buf.get_i64();
        let days = buf.get_i32();
        let months = buf.get_i32();
        ensure!(buf.remaining() == 0, errors::ExtraData);
        ensure!(days == 0 && months == 0, errors::NonZeroDurationParts);
        Ok(Value::Duration(model::Duration::from_micros(micros)))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Duration(value) => {
                buf.reserve(16);
                buf.put_i64(value.micros());
                buf.put_i32(0);
                buf.put_i32(0);
                Ok(())
            }
            _ => Err(invalid_value("std::duration", value)),
        }
    }
}

impl Codec for Json {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let format = buf.get_u8();
        ensure!(format == 1, errors::InvalidJsonFormat);
        let text = std::str::from_utf8(buf).context(errors::InvalidUtf8)?;
        Ok(Value::Json(model::Json::new_unchecked(text.to_owned())))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Json(value) => {
                buf.reserve(1 + value.as_ref().len());
                buf.put_u8(1);
                buf.extend(value.as_ref().as_bytes());
                Ok(())
            }
            _ => Err(invalid_value("std::json", value)),
        }
    }
}

fn decode_bignum_header(buf: &mut &[u8]) -> Result<(u16, i16, bool, u16), DecodeError> {
    ensure!(buf.remaining() >= 8, errors::Underflow);
    let ndigits = buf.get_u16();
    let weight = buf.get_i16();
    let negative = match buf.get_u16() {
        0x0000 => false,
        0x4000 => true,
        _ => errors::BadSign.fail()?,
    };
    let decimal_digits = buf.get_u16();
    ensure!(buf.remaining() >= 2 * usize::from(ndigits), errors::Underflow);
    Ok((ndigits, weight, negative, decimal_digits))
}

impl Codec for BigInt {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        let (ndigits, weight, negative, _dscale) = decode_bignum_header(&mut buf)?;
        let mut digits = Vec::with_capacity(ndigits.into());
        for _ in 0..ndigits {
            digits.push(buf.get_u16());
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::BigInt(model::BigInt {
            negative,
            weight,
            digits,
        }))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::BigInt(value) => {
                let ndigits = u16::try_from(value.digits.len())
                    .ok()
                    .context(errors::BigIntTooLong)?;
                buf.reserve(8 + 2 * usize::from(ndigits));
                buf.put_u16(ndigits);
                buf.put_i16(value.weight);
                buf.put_u16(if value.negative { 0x4000 } else { 0x0000 });
                buf.put_u16(0);
                for &digit in &value.digits {
                    buf.put_u16(digit);
                }
                Ok(())
            }
            _ => Err(invalid_value("std::bigint", value)),
        }
    }
}

impl Codec for Decimal {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        let (ndigits, weight, negative, decimal_digits) = decode_bignum_header(&mut buf)?;
        let mut digits = Vec::with_capacity(ndigits.into());
        for _ in 0..ndigits {
            digits.push(buf.get_u16());
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Decimal(model::Decimal {
            negative,
            weight,
            decimal_digits,
            digits,
        }))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Decimal(value) => {
                let ndigits = u16::try_from(value.digits.len())
                    .ok()
                    .context(errors::DecimalTooLong)?;
                buf.reserve(8 + 2 * usize::from(ndigits));
                buf.put_u16(ndigits);
                buf.put_i16(value.weight);
                buf.put_u16(if value.negative { 0x4000 } else { 0x0000 });
                buf.put_u16(value.decimal_digits);
                for &digit in &value.digits {
                    buf.put_u16(digit);
                }
                Ok(())
            }
            _ => Err(invalid_value("std::decimal", value)),
        }
    }
}

/// Reads one `i32`-length-prefixed element; `-1` is the null marker.
fn decode_element<'a>(buf: &mut &'a [u8]) -> Result<Option<&'a [u8]>, DecodeError> {
    ensure!(buf.remaining() >= 4, errors::Underflow);
    let len = buf.get_i32();
    if len < 0 {
        ensure!(len == -1, errors::InvalidMarker);
        return Ok(None);
    }
    let len = len as usize;
    ensure!(buf.remaining() >= len, errors::Underflow);
    let slice = *buf;
    let (element, rest) = slice.split_at(len);
    *buf = rest;
    Ok(Some(element))
}

fn encode_element(
    buf: &mut BytesMut,
    codec: &Arc<dyn Codec>,
    value: &Value,
) -> Result<(), EncodeError> {
    buf.reserve(4);
    let base = buf.len();
    buf.put_i32(0);
    codec.encode(buf, value)?;
    let size = i32::try_from(buf.len() - base - 4)
        .ok()
        .context(errors::ElementTooLong)?;
    buf[base..base + 4].copy_from_slice(&size.to_be_bytes());
    Ok(())
}

/// The shared array/set envelope. Returns `None` for the `ndims = 0`
/// (empty) form, otherwise the declared element count.
fn decode_array_envelope(buf: &mut &[u8]) -> Result<Option<usize>, DecodeError> {
    ensure!(buf.remaining() >= 12, errors::Underflow);
    let ndims = buf.get_i32();
    let _reserved0 = buf.get_i32();
    let _reserved1 = buf.get_i32();
    if ndims == 0 {
        ensure!(buf.remaining() == 0, errors::ExtraData);
        return Ok(None);
    }
    ensure!(ndims == 1, errors::InvalidArrayShape);
    ensure!(buf.remaining() >= 8, errors::Underflow);
    let size = buf.get_i32();
    let _lower = buf.get_i32();
    ensure!(size >= 0, errors::InvalidArrayShape);
    Ok(Some(size as usize))
}

fn encode_array_elements(
    buf: &mut BytesMut,
    element: &Arc<dyn Codec>,
    items: &[Value],
) -> Result<(), EncodeError> {
    if items.is_empty() {
        buf.reserve(12);
        buf.put_i32(0);
        buf.put_i32(0);
        buf.put_i32(0);
        return Ok(());
    }
    buf.reserve(20);
    buf.put_i32(1);
    buf.put_i32(0);
    buf.put_i32(0);
    buf.put_i32(
        i32::try_from(items.len())
            .ok()
            .context(errors::ArrayTooLong)?,
    );
    buf.put_i32(1);
    for item in items {
        encode_element(buf, element, item)?;
    }
    Ok(())
}

impl Codec for ArrayCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        let Some(size) = decode_array_envelope(&mut buf)? else {
            return Ok(Value::Array(Vec::new()));
        };
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            let element = decode_element(&mut buf)?.ok_or_else(|| errors::InvalidMarker.build())?;
            items.push(self.element.decode(element)?);
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Array(items))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Array(items) => encode_array_elements(buf, &self.element, items),
            _ => Err(invalid_value("array", value)),
        }
    }
}

impl Codec for SetCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        let Some(size) = decode_array_envelope(&mut buf).map_err(|e| match e {
            DecodeError::InvalidArrayShape { .. } => errors::InvalidSetShape.build(),
            e => e,
        })?
        else {
            return Ok(Value::Set(Vec::new()));
        };
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            let element = decode_element(&mut buf)?.ok_or_else(|| errors::InvalidMarker.build())?;
            items.push(self.element.decode(element)?);
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Set(items))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Set(items) => encode_array_elements(buf, &self.element, items),
            _ => Err(invalid_value("set", value)),
        }
    }
}

impl Codec for TupleCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let size = buf.get_i32();
        ensure!(
            size >= 0 && size as usize == self.elements.len(),
            errors::TupleSizeMismatch
        );
        let mut fields = Vec::with_capacity(self.elements.len());
        for codec in &self.elements {
            ensure!(buf.remaining() >= 4, errors::Underflow);
            let _reserved = buf.get_i32();
            let element = decode_element(&mut buf)?.ok_or_else(|| errors::InvalidMarker.build())?;
            fields.push(codec.decode(element)?);
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Tuple(fields))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        let fields = match value {
            Value::Tuple(fields) => fields,
            _ => return Err(invalid_value("tuple", value)),
        };
        if fields.len() != self.elements.len() {
            return Err(errors::TupleShapeMismatch.build());
        }
        buf.reserve(4);
        buf.put_i32(
            i32::try_from(fields.len())
                .ok()
                .context(errors::TooManyElements)?,
        );
        for (codec, field) in self.elements.iter().zip(fields) {
            buf.reserve(4);
            buf.put_i32(0);
            encode_element(buf, codec, field)?;
        }
        Ok(())
    }
}

impl Codec for NamedTupleCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let size = buf.get_i32();
        ensure!(
            size >= 0 && size as usize == self.elements.len(),
            errors::TupleSizeMismatch
        );
        let mut fields = Vec::with_capacity(self.elements.len());
        for codec in &self.elements {
            ensure!(buf.remaining() >= 4, errors::Underflow);
            let _reserved = buf.get_i32();
            let element = decode_element(&mut buf)?.ok_or_else(|| errors::InvalidMarker.build())?;
            fields.push(codec.decode(element)?);
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::NamedTuple {
            shape: self.shape.clone(),
            fields,
        })
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        let fields = match value {
            Value::NamedTuple { shape, fields } => {
                if shape != &self.shape {
                    return Err(errors::TupleShapeMismatch.build());
                }
                fields
            }
            _ => return Err(invalid_value("named tuple", value)),
        };
        buf.reserve(4);
        buf.put_i32(
            i32::try_from(fields.len())
                .ok()
                .context(errors::TooManyElements)?,
        );
        for (codec, field) in self.elements.iter().zip(fields) {
            buf.reserve(4);
            buf.put_i32(0);
            encode_element(buf, codec, field)?;
        }
        Ok(())
    }
}

impl Codec for ObjectCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let size = buf.get_i32();
        ensure!(
            size >= 0 && size as usize == self.codecs.len(),
            errors::ObjectSizeMismatch
        );
        let mut fields = Vec::with_capacity(self.codecs.len());
        for codec in &self.codecs {
            ensure!(buf.remaining() >= 4, errors::Underflow);
            let _reserved = buf.get_i32();
            match decode_element(&mut buf)? {
                Some(element) => fields.push(Some(codec.decode(element)?)),
                None => fields.push(None),
            }
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Object {
            shape: self.shape.clone(),
            fields,
        })
    }
    fn encode(&self, _buf: &mut BytesMut, _value: &Value) -> Result<(), EncodeError> {
        // Objects only flow from the server to the client.
        errors::ObjectsNotEncodable.fail()
    }
}

impl Codec for InputShapeCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let size = buf.get_i32();
        ensure!(
            size >= 0 && size as usize == self.codecs.len(),
            errors::ObjectSizeMismatch
        );
        let mut fields = Vec::with_capacity(self.codecs.len());
        for codec in &self.codecs {
            ensure!(buf.remaining() >= 4, errors::Underflow);
            let _reserved = buf.get_i32();
            match decode_element(&mut buf)? {
                Some(element) => fields.push(Some(codec.decode(element)?)),
                None => fields.push(None),
            }
        }
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Object {
            shape: self.shape.clone(),
            fields,
        })
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        let fields = match value {
            Value::Object { shape, fields } => {
                if shape != &self.shape {
                    return Err(errors::ObjectShapeMismatch.build());
                }
                fields
            }
            _ => return Err(invalid_value("arguments", value)),
        };
        if fields.len() != self.codecs.len() {
            return Err(errors::ObjectShapeMismatch.build());
        }
        buf.reserve(4);
        buf.put_i32(
            i32::try_from(fields.len())
                .ok()
                .context(errors::TooManyElements)?,
        );
        for (codec, field) in self.codecs.iter().zip(fields) {
            buf.reserve(4);
            buf.put_i32(0);
            match field {
                Some(value) => encode_element(buf, codec, value)?,
                None => {
                    buf.reserve(4);
                    buf.put_i32(-1);
                }
            }
        }
        Ok(())
    }
}

impl Codec for EnumCodec {
    fn decode(&self, buf: &[u8]) -> Result<Value, DecodeError> {
        let member = std::str::from_utf8(buf).context(errors::InvalidUtf8)?;
        let member = self
            .members
            .iter()
            .find(|m| ***m == *member)
            .ok_or_else(|| errors::ExtraEnumValue.build())?;
        Ok(Value::Enum(EnumValue::new(member.clone())))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        let member = match value {
            Value::Enum(member) => member.as_ref(),
            Value::Str(text) => text.as_str(),
            _ => return Err(invalid_value("enum", value)),
        };
        if !self.members.iter().any(|m| **m == *member) {
            return Err(errors::MissingEnumValue.build());
        }
        buf.extend(member.as_bytes());
        Ok(())
    }
}

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

impl Codec for RangeCodec {
    fn decode(&self, mut buf: &[u8]) -> Result<Value, DecodeError> {
        ensure!(buf.remaining() >= 1, errors::Underflow);
        let flags = buf.get_u8();
        if flags & RANGE_EMPTY != 0 {
            ensure!(buf.remaining() == 0, errors::ExtraData);
            return Ok(Value::Range(crate::value::Range::empty()));
        }
        let lower = if flags & RANGE_LB_INF == 0 {
            let element = decode_element(&mut buf)?.ok_or_else(|| errors::InvalidMarker.build())?;
            Some(self.element.decode(element)?)
        } else {
            None
        };
        let upper = if flags & RANGE_UB_INF == 0 {
            let element = decode_element(&mut buf)?.ok_or_else(|| errors::InvalidMarker.build())?;
            Some(self.element.decode(element)?)
        } else {
            None
        };
        ensure!(buf.remaining() == 0, errors::ExtraData);
        Ok(Value::Range(crate::value::Range::new(
            lower,
            upper,
            flags & RANGE_LB_INC != 0,
            flags & RANGE_UB_INC != 0,
        )))
    }
    fn encode(&self, buf: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
        let range = match value {
            Value::Range(range) => range,
            _ => return Err(invalid_value("range", value)),
        };
        let mut flags = 0u8;
        if range.is_empty() {
            flags |= RANGE_EMPTY;
        } else {
            if range.inc_lower() {
                flags |= RANGE_LB_INC;
            }
            if range.inc_upper() {
                flags |= RANGE_UB_INC;
            }
            if range.lower().is_none() {
                flags |= RANGE_LB_INF;
            }
            if range.upper().is_none() {
                flags |= RANGE_UB_INF;
            }
        }
        buf.reserve(1);
        buf.put_u8(flags);
        if !range.is_empty() {
            if let Some(lower) = range.lower() {
                encode_element(buf, &self.element, lower)?;
            }
            if let Some(upper) = range.upper() {
                encode_element(buf, &self.element, upper)?;
            }
        }
        Ok(())
    }
}
