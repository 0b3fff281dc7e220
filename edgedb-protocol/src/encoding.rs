/*!
Primitive wire encoding: the [Input]/[Output] cursors, the [Encode] and
[Decode] traits and their implementations for the length-prefixed scalars
every message is built from. All integers are big-endian.
*/

use std::collections::HashMap;
use std::convert::TryFrom;
use std::ops::{Deref, DerefMut};
use std::str;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use snafu::{ensure, OptionExt, ResultExt};
use uuid::Uuid;

use crate::errors::{self, DecodeError, EncodeError};
use crate::features::ProtocolVersion;

/// Message headers: an ordered-on-the-wire sequence of `(code, value)`
/// pairs, stored as a map because codes are unique per message.
pub type KeyValues = HashMap<u16, Bytes>;

/// A decoding cursor over one received frame.
pub struct Input {
    #[allow(dead_code)]
    proto: ProtocolVersion,
    bytes: Bytes,
}

/// An encoding sink for one or more outgoing frames.
pub struct Output<'a> {
    #[allow(dead_code)]
    proto: &'a ProtocolVersion,
    buf: &'a mut BytesMut,
}

impl Input {
    pub fn new(proto: ProtocolVersion, bytes: Bytes) -> Input {
        Input { proto, bytes }
    }
    pub fn proto(&self) -> &ProtocolVersion {
        &self.proto
    }
    /// A sub-cursor over `range` of the remaining bytes; does not advance.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Input {
        Input {
            proto: self.proto.clone(),
            bytes: self.bytes.slice(range),
        }
    }
}

impl Buf for Input {
    fn remaining(&self) -> usize {
        self.bytes.remaining()
    }
    fn chunk(&self) -> &[u8] {
        self.bytes.chunk()
    }
    fn advance(&mut self, cnt: usize) {
        self.bytes.advance(cnt)
    }
    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        self.bytes.copy_to_bytes(len)
    }
}

impl Deref for Input {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<'a> Output<'a> {
    pub fn new(proto: &'a ProtocolVersion, buf: &'a mut BytesMut) -> Output<'a> {
        Output { proto, buf }
    }
    pub fn proto(&self) -> &ProtocolVersion {
        self.proto
    }
}

impl Deref for Output<'_> {
    type Target = BytesMut;
    fn deref(&self) -> &BytesMut {
        self.buf
    }
}

impl DerefMut for Output<'_> {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf
    }
}

pub trait Encode {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError>;
}

pub trait Decode: Sized {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError>;
}

/// Writes one full frame: the message tag, the length prefix (covering
/// itself and the payload, but not the tag) and the payload.
pub fn encode<T: Encode>(buf: &mut Output, mtype: u8, message: &T) -> Result<(), EncodeError> {
    buf.reserve(5);
    buf.put_u8(mtype);
    let base = buf.len();
    buf.put_slice(&[0; 4]);
    message.encode(buf)?;
    let size = u32::try_from(buf.len() - base)
        .ok()
        .context(errors::MessageTooLong)?;
    buf[base..base + 4].copy_from_slice(&size.to_be_bytes());
    Ok(())
}

impl Encode for String {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        self.as_str().encode(buf)
    }
}

impl Encode for &str {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        let len = u32::try_from(self.len()).ok().context(errors::StringTooLong)?;
        buf.reserve(4 + self.len());
        buf.put_u32(len);
        buf.extend(self.as_bytes());
        Ok(())
    }
}

impl Decode for String {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let data = Bytes::decode(buf)?;
        let text = str::from_utf8(&data).context(errors::InvalidUtf8)?;
        Ok(text.to_owned())
    }
}

impl Encode for Bytes {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        let len = u32::try_from(self.len()).ok().context(errors::ElementTooLong)?;
        buf.reserve(4 + self.len());
        buf.put_u32(len);
        buf.extend(&self[..]);
        Ok(())
    }
}

impl Decode for Bytes {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);
        let len = buf.get_u32() as usize;
        ensure!(buf.remaining() >= len, errors::Underflow);
        Ok(buf.copy_to_bytes(len))
    }
}

impl Encode for Uuid {
    fn encode(&self, buf: &mut Output) -> Result<(), EncodeError> {
        buf.reserve(16);
        buf.extend(self.as_bytes());
        Ok(())
    }
}

impl Decode for Uuid {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 16, errors::Underflow);
        let mut bytes = [0u8; 16];
        buf.copy_to_slice(&mut bytes);
        Ok(Uuid::from_bytes(bytes))
    }
}

pub(crate) fn encode_key_values(buf: &mut Output, kv: &KeyValues) -> Result<(), EncodeError> {
    buf.reserve(2);
    buf.put_u16(u16::try_from(kv.len()).ok().context(errors::TooManyHeaders)?);
    for (&code, value) in kv {
        buf.reserve(2);
        buf.put_u16(code);
        value.encode(buf)?;
    }
    Ok(())
}

pub(crate) fn decode_key_values(buf: &mut Input) -> Result<KeyValues, DecodeError> {
    ensure!(buf.remaining() >= 2, errors::Underflow);
    let num = buf.get_u16();
    let mut kv = HashMap::with_capacity(num.into());
    for _ in 0..num {
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let code = buf.get_u16();
        let value = Bytes::decode(buf)?;
        kv.insert(code, value);
    }
    Ok(kv)
}
